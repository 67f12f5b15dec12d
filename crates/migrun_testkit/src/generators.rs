//! Property-based test generators using proptest.
//!
//! Provides strategies for generating keys, documents, write plans and lock
//! timings that keep the values the runner requires valid.

use migrun_store::Document;
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for generating valid item keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating small flat documents.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        ],
        0..6,
    )
    .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for the distinct keys one change unit writes.
///
/// Produces between `min` and `max` keys, in a random order.
pub fn write_plan_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(key_strategy(), min..=max)
        .prop_map(|keys| keys.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

/// Timing of a contended lock acquisition, in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct LockTiming {
    /// Time left on the rival's lease when acquisition starts.
    pub held_for: u64,
    /// Polling interval.
    pub poll: u64,
    /// Give-up deadline.
    pub give_up: u64,
}

/// Strategy for lock timings.
pub fn lock_timing_strategy() -> impl Strategy<Value = LockTiming> {
    (1u64..10_000, 1u64..1_000, 0u64..20_000).prop_map(|(held_for, poll, give_up)| LockTiming {
        held_for,
        poll,
        give_up,
    })
}

/// Configuration for property-based tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn keys_start_with_letter(key in key_strategy()) {
            let first = key.chars().next();
            prop_assert!(first.is_some_and(|c| c.is_ascii_lowercase()));
        }

        #[test]
        fn write_plans_are_distinct(keys in write_plan_strategy(0, 20)) {
            let unique: HashSet<_> = keys.iter().collect();
            prop_assert_eq!(unique.len(), keys.len());
            prop_assert!(keys.len() <= 20);
        }

        #[test]
        fn documents_are_small(doc in document_strategy()) {
            prop_assert!(doc.len() < 6);
        }
    }
}
