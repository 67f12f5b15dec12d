//! Document store trait definition.

use crate::document::{Condition, Document};
use crate::error::StoreResult;
use crate::operation::WriteOperation;
use serde::{Deserialize, Serialize};

/// Default ceiling for a single atomic write.
pub const DEFAULT_MAX_TRANSACT_ITEMS: usize = 100;

/// Provisioned read/write capacity hints for a collection.
///
/// Stores without a notion of capacity record the hint and otherwise
/// ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    /// Read capacity units.
    pub read: u64,
    /// Write capacity units.
    pub write: u64,
}

impl Capacity {
    /// Creates a capacity hint.
    #[must_use]
    pub const fn new(read: u64, write: u64) -> Self {
        Self { read, write }
    }
}

/// How a collection should be provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSpec {
    /// Name of the attribute the collection is keyed by.
    pub key_field: String,
    /// Whether the collection (and its key index) may be created when missing.
    pub create_if_missing: bool,
    /// Optional capacity hint.
    pub capacity: Option<Capacity>,
}

impl CollectionSpec {
    /// Creates a spec keyed by `key_field` that provisions missing collections.
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            create_if_missing: true,
            capacity: None,
        }
    }

    /// Sets whether missing collections may be created.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the capacity hint.
    #[must_use]
    pub fn with_capacity(mut self, capacity: Option<Capacity>) -> Self {
        self.capacity = capacity;
        self
    }
}

/// A remote document store as seen by the migration runner.
///
/// # Invariants
///
/// - `put` and `delete` apply only if their condition holds for the current
///   item, otherwise they fail with `StoreError::ConditionFailed` and change
///   nothing
/// - `transact_write` applies every operation or none, in the given order
/// - `transact_write` rejects more than `max_transact_items()` operations
///   with `StoreError::TooManyItems`
/// - Stores must be `Send + Sync` so one handle can be shared by the lock
///   manager, the ledger and the transaction coordinator
pub trait DocumentStore: Send + Sync {
    /// Reads an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist or the read fails.
    fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Document>>;

    /// Writes an item if `condition` holds for its current version.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConditionFailed` if the condition does not hold.
    fn put(
        &self,
        collection: &str,
        key: &str,
        document: Document,
        condition: &Condition,
    ) -> StoreResult<()>;

    /// Deletes an item if `condition` holds for its current version.
    ///
    /// Deleting a missing item with a condition that holds for `None` is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConditionFailed` if the condition does not hold.
    fn delete(&self, collection: &str, key: &str, condition: &Condition) -> StoreResult<()>;

    /// Lists every item in a collection, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist or the read fails.
    fn scan(&self, collection: &str) -> StoreResult<Vec<(String, Document)>>;

    /// Applies all operations atomically.
    ///
    /// # Errors
    ///
    /// Returns an error, with nothing applied, if any condition fails, any
    /// target collection is missing, or the item ceiling is exceeded.
    fn transact_write(&self, operations: &[WriteOperation]) -> StoreResult<()>;

    /// Returns the maximum number of operations accepted by `transact_write`.
    fn max_transact_items(&self) -> usize {
        DEFAULT_MAX_TRANSACT_ITEMS
    }

    /// Makes sure a collection exists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CollectionNotFound` if it is missing and the spec
    /// forbids creating it.
    fn ensure_collection(&self, name: &str, spec: &CollectionSpec) -> StoreResult<()>;
}
