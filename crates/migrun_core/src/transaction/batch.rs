//! The per-change-unit write batch.

use crate::error::{CoreError, CoreResult};
use crate::types::BatchId;
use migrun_store::WriteOperation;
use parking_lot::Mutex;

/// Writes queued by one change unit, committed together.
///
/// A batch never holds more than `limit` operations: the write that would
/// cross the ceiling is rejected and the batch is left as it was.
#[derive(Debug)]
pub struct TransactionBatch {
    id: BatchId,
    limit: usize,
    state: Mutex<BatchState>,
}

#[derive(Debug, Default)]
struct BatchState {
    /// Queued writes in insertion order.
    operations: Vec<WriteOperation>,
    /// How many of `operations` came from the change unit itself.
    user_operations: usize,
}

impl TransactionBatch {
    /// Creates an empty batch holding at most `limit` operations.
    #[must_use]
    pub fn new(id: BatchId, limit: usize) -> Self {
        Self {
            id,
            limit,
            state: Mutex::new(BatchState::default()),
        }
    }

    /// Returns the batch ID.
    #[must_use]
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Returns the operation ceiling.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Queues a write issued by the change unit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BatchCapacityExceeded`] if the batch is full.
    pub fn push(&self, operation: WriteOperation) -> CoreResult<()> {
        self.push_inner(operation, true)
    }

    /// Queues a bookkeeping write issued by the entry ledger.
    ///
    /// Ledger writes share the ceiling with the change unit's own writes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BatchCapacityExceeded`] if the batch is full.
    pub fn push_ledger(&self, operation: WriteOperation) -> CoreResult<()> {
        self.push_inner(operation, false)
    }

    fn push_inner(&self, operation: WriteOperation, user: bool) -> CoreResult<()> {
        let mut state = self.state.lock();
        let attempted = state.operations.len() + 1;
        if attempted > self.limit {
            return Err(CoreError::BatchCapacityExceeded {
                limit: self.limit,
                attempted,
            });
        }
        state.operations.push(operation);
        if user {
            state.user_operations += 1;
        }
        Ok(())
    }

    /// Number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().operations.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().operations.is_empty()
    }

    /// Number of queued operations issued by the change unit.
    #[must_use]
    pub fn user_operations(&self) -> usize {
        self.state.lock().user_operations
    }

    /// Returns a copy of the queued operations in insertion order.
    #[must_use]
    pub fn operations(&self) -> Vec<WriteOperation> {
        self.state.lock().operations.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrun_store::Document;

    fn op(key: &str) -> WriteOperation {
        WriteOperation::put("users", key, Document::new())
    }

    #[test]
    fn counts_user_and_ledger_writes() {
        let batch = TransactionBatch::new(BatchId::new(1), 10);
        batch.push(op("a")).unwrap();
        batch.push(op("b")).unwrap();
        batch.push_ledger(op("entry")).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.user_operations(), 2);
        let keys: Vec<_> = batch.operations().into_iter().map(|o| o.key).collect();
        assert_eq!(keys, ["a", "b", "entry"]);
    }

    #[test]
    fn rejects_writes_past_limit() {
        let batch = TransactionBatch::new(BatchId::new(1), 2);
        batch.push(op("a")).unwrap();
        batch.push(op("b")).unwrap();

        let err = batch.push(op("c")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::BatchCapacityExceeded {
                limit: 2,
                attempted: 3
            }
        ));
        assert!(batch.push_ledger(op("entry")).is_err());
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn new_batch_is_empty() {
        let batch = TransactionBatch::new(BatchId::new(4), 100);
        assert!(batch.is_empty());
        assert_eq!(batch.id(), BatchId::new(4));
        assert_eq!(batch.limit(), 100);
    }
}
