//! Error types for the migration core.

use migrun_store::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Boxed error returned by change-unit bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while running migrations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The give-up deadline passed while contending for the lock.
    #[error(
        "lock '{lock_name}' not acquired after {waited_ms} ms (held by {})",
        .holder.as_deref().unwrap_or("unknown")
    )]
    LockNotAcquired {
        /// Name of the lock.
        lock_name: String,
        /// How long the caller kept trying.
        waited_ms: u64,
        /// Owner of the lease at give-up time, if known.
        holder: Option<String>,
    },

    /// The lease could not be renewed because this runner no longer owns it.
    #[error("lock '{lock_name}' is no longer held by this runner")]
    LockNotHeld {
        /// Name of the lock.
        lock_name: String,
    },

    /// A change unit body or its commit failed.
    #[error("change unit '{change_id}' failed: {source}")]
    MigrationExecution {
        /// The change unit that failed.
        change_id: String,
        /// The original failure.
        #[source]
        source: BoxError,
    },

    /// A transaction batch grew past the store's atomic-write ceiling.
    #[error("transaction batch of {attempted} operations exceeds the limit of {limit}")]
    BatchCapacityExceeded {
        /// The store's item ceiling.
        limit: usize,
        /// The batch size that was attempted.
        attempted: usize,
    },

    /// Two change units share an id.
    #[error("change unit '{change_id}' is already registered")]
    DuplicateChangeUnit {
        /// The duplicated id.
        change_id: String,
    },

    /// The runner configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Wraps a change-unit failure.
    pub fn execution(change_id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::MigrationExecution {
            change_id: change_id.into(),
            source: source.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps a failure raised inside a transaction.
    ///
    /// Capacity errors keep their own kind; everything else becomes
    /// [`CoreError::MigrationExecution`] with the failure as its source.
    pub(crate) fn from_body(change_id: &str, error: BoxError) -> Self {
        match error.downcast::<CoreError>() {
            Ok(core) => match *core {
                capacity @ CoreError::BatchCapacityExceeded { .. } => capacity,
                other => Self::execution(change_id, other),
            },
            Err(other) => Self::execution(change_id, other),
        }
    }
}
