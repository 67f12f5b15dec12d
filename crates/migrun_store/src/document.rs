//! Documents and write conditions.

use serde_json::{Map, Value};

/// A stored item: a JSON object with string keys.
pub type Document = Map<String, Value>;

/// A condition evaluated against the current version of an item before a
/// write is applied.
///
/// Numeric comparisons read the field as an `i64`; a missing or non-numeric
/// field never satisfies them.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Always holds.
    Always,
    /// The item must not exist.
    NotExists,
    /// The item must exist.
    Exists,
    /// The item must exist and `field` must equal `value`.
    FieldEquals {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// The item must exist and `field` must be `<= value`.
    FieldAtMost {
        /// Field name.
        field: String,
        /// Upper bound (inclusive).
        value: i64,
    },
    /// The item must exist and `field` must be `> value`.
    FieldGreaterThan {
        /// Field name.
        field: String,
        /// Lower bound (exclusive).
        value: i64,
    },
    /// At least one of the conditions must hold.
    Any(Vec<Condition>),
    /// Every condition must hold.
    All(Vec<Condition>),
}

impl Condition {
    /// Creates a field equality condition.
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates an inclusive upper bound condition.
    pub fn field_at_most(field: impl Into<String>, value: i64) -> Self {
        Self::FieldAtMost {
            field: field.into(),
            value,
        }
    }

    /// Creates an exclusive lower bound condition.
    pub fn field_greater_than(field: impl Into<String>, value: i64) -> Self {
        Self::FieldGreaterThan {
            field: field.into(),
            value,
        }
    }

    /// Evaluates the condition against the current item, if any.
    #[must_use]
    pub fn evaluate(&self, current: Option<&Document>) -> bool {
        match self {
            Self::Always => true,
            Self::NotExists => current.is_none(),
            Self::Exists => current.is_some(),
            Self::FieldEquals { field, value } => {
                current.and_then(|doc| doc.get(field)) == Some(value)
            }
            Self::FieldAtMost { field, value } => {
                numeric_field(current, field).is_some_and(|v| v <= *value)
            }
            Self::FieldGreaterThan { field, value } => {
                numeric_field(current, field).is_some_and(|v| v > *value)
            }
            Self::Any(conditions) => conditions.iter().any(|c| c.evaluate(current)),
            Self::All(conditions) => conditions.iter().all(|c| c.evaluate(current)),
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::Always
    }
}

fn numeric_field(current: Option<&Document>, field: &str) -> Option<i64> {
    current.and_then(|doc| doc.get(field)).and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn existence_conditions() {
        let d = doc(json!({"a": 1}));
        assert!(Condition::NotExists.evaluate(None));
        assert!(!Condition::NotExists.evaluate(Some(&d)));
        assert!(Condition::Exists.evaluate(Some(&d)));
        assert!(!Condition::Exists.evaluate(None));
        assert!(Condition::Always.evaluate(None));
    }

    #[test]
    fn field_equality() {
        let d = doc(json!({"owner": "a"}));
        assert!(Condition::field_equals("owner", "a").evaluate(Some(&d)));
        assert!(!Condition::field_equals("owner", "b").evaluate(Some(&d)));
        assert!(!Condition::field_equals("owner", "a").evaluate(None));
    }

    #[test]
    fn numeric_bounds() {
        let d = doc(json!({"expiresAt": 100}));
        assert!(Condition::field_at_most("expiresAt", 100).evaluate(Some(&d)));
        assert!(!Condition::field_at_most("expiresAt", 99).evaluate(Some(&d)));
        assert!(Condition::field_greater_than("expiresAt", 99).evaluate(Some(&d)));
        assert!(!Condition::field_greater_than("expiresAt", 100).evaluate(Some(&d)));
    }

    #[test]
    fn non_numeric_field_never_matches_bounds() {
        let d = doc(json!({"expiresAt": "soon"}));
        assert!(!Condition::field_at_most("expiresAt", i64::MAX).evaluate(Some(&d)));
        assert!(!Condition::field_greater_than("missing", i64::MIN).evaluate(Some(&d)));
    }

    #[test]
    fn combinators() {
        let d = doc(json!({"owner": "a", "expiresAt": 10}));
        let takeover = Condition::Any(vec![
            Condition::NotExists,
            Condition::field_at_most("expiresAt", 5),
            Condition::field_equals("owner", "a"),
        ]);
        assert!(takeover.evaluate(Some(&d)));
        assert!(takeover.evaluate(None));

        let renew = Condition::All(vec![
            Condition::field_equals("owner", "a"),
            Condition::field_greater_than("expiresAt", 20),
        ]);
        assert!(!renew.evaluate(Some(&d)));
    }
}
