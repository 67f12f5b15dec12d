//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The write condition did not hold for the target item.
    #[error("condition failed for {collection}/{key}")]
    ConditionFailed {
        /// The collection the item lives in.
        collection: String,
        /// The key of the item.
        key: String,
    },

    /// An atomic write carried more items than the store accepts.
    #[error("atomic write of {actual} items exceeds the limit of {limit}")]
    TooManyItems {
        /// The store's item ceiling.
        limit: usize,
        /// The number of items submitted.
        actual: usize,
    },

    /// The collection does not exist and was not provisioned.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// The persisted store state is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Creates a condition failed error.
    pub fn condition_failed(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ConditionFailed {
            collection: collection.into(),
            key: key.into(),
        }
    }

    /// Returns true if this error means a write condition did not hold.
    #[must_use]
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, Self::ConditionFailed { .. })
    }
}
