//! Per-change-unit transaction coordinator.

use crate::dependency::DependencyRegistry;
use crate::entry::EntryLedger;
use crate::error::{BoxError, CoreError, CoreResult};
use crate::transaction::batch::TransactionBatch;
use crate::transaction::context::ChangeContext;
use crate::types::BatchId;
use migrun_store::DocumentStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What a committed change unit did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The batch was written in one atomic call.
    Committed {
        /// Total operations written, ledger writes included.
        operations: usize,
        /// Operations issued by the change unit itself.
        user_operations: usize,
    },
    /// Nothing was queued, so no commit was issued.
    NoOp,
}

impl TransactionOutcome {
    /// Number of operations written.
    #[must_use]
    pub fn operations(&self) -> usize {
        match self {
            Self::Committed { operations, .. } => *operations,
            Self::NoOp => 0,
        }
    }
}

/// Runs each change unit inside its own atomic batch.
///
/// The coordinator:
/// - Allocates a fresh batch per invocation and shares it with the ledger
///   and the dependency registry for exactly that invocation
/// - Commits the batch with a single `transact_write` if the unit succeeds
/// - Discards it otherwise
///
/// Only one batch is live at a time; nested invocations are rejected.
pub struct TransactionCoordinator {
    store: Arc<dyn DocumentStore>,
    ledger: Arc<dyn EntryLedger>,
    dependencies: Arc<DependencyRegistry>,
    next_batch: AtomicU64,
    current: Mutex<Option<Arc<TransactionBatch>>>,
}

impl TransactionCoordinator {
    /// Creates a coordinator.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        ledger: Arc<dyn EntryLedger>,
        dependencies: Arc<DependencyRegistry>,
    ) -> Self {
        Self {
            store,
            ledger,
            dependencies,
            next_batch: AtomicU64::new(1),
            current: Mutex::new(None),
        }
    }

    /// Largest batch the store accepts.
    #[must_use]
    pub fn max_items(&self) -> usize {
        self.store.max_transact_items()
    }

    /// The batch of the invocation in flight, if any.
    #[must_use]
    pub fn current_batch(&self) -> Option<Arc<TransactionBatch>> {
        self.current.lock().clone()
    }

    /// Returns true while an invocation is in flight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Runs `body` with a fresh batch and commits what it queued.
    ///
    /// # Errors
    ///
    /// - [`CoreError::BatchCapacityExceeded`] if the unit queued more writes
    ///   than the store accepts in one call
    /// - [`CoreError::MigrationExecution`] wrapping any other failure of the
    ///   body or of the commit
    /// - [`CoreError::InvalidOperation`] if called while another invocation
    ///   is in flight
    pub fn run_in_transaction<F>(&self, change_id: &str, body: F) -> CoreResult<TransactionOutcome>
    where
        F: FnOnce(&mut ChangeContext<'_>) -> Result<(), BoxError>,
    {
        let scope = self.begin()?;
        let batch = Arc::clone(&scope.batch);

        {
            let mut ctx = ChangeContext::transactional(
                change_id,
                self.store.as_ref(),
                &batch,
                &self.dependencies,
            );
            body(&mut ctx).map_err(|e| CoreError::from_body(change_id, e))?;
        }

        let outcome = self.commit(change_id, &batch);
        drop(scope);
        outcome
    }

    fn begin(&self) -> CoreResult<TransactionScope<'_>> {
        let mut current = self.current.lock();
        if let Some(active) = current.as_ref() {
            return Err(CoreError::invalid_operation(format!(
                "{} is still in flight",
                active.id()
            )));
        }

        let id = BatchId::new(self.next_batch.fetch_add(1, Ordering::SeqCst));
        let batch = Arc::new(TransactionBatch::new(id, self.max_items()));
        *current = Some(Arc::clone(&batch));
        drop(current);

        self.ledger.attach_batch(Arc::clone(&batch));
        self.dependencies.set(Arc::clone(&batch), true);
        tracing::debug!(batch = %id, "transaction started");

        Ok(TransactionScope {
            coordinator: self,
            batch,
        })
    }

    fn commit(&self, change_id: &str, batch: &TransactionBatch) -> CoreResult<TransactionOutcome> {
        let operations = batch.operations();
        if operations.is_empty() {
            tracing::debug!(change_id, batch = %batch.id(), "nothing to commit");
            return Ok(TransactionOutcome::NoOp);
        }

        let user_operations = batch.user_operations();
        if user_operations == 0 {
            tracing::debug!(change_id, batch = %batch.id(), "no user writes, committing ledger only");
        }
        if operations.len() > batch.limit() {
            return Err(CoreError::BatchCapacityExceeded {
                limit: batch.limit(),
                attempted: operations.len(),
            });
        }

        self.store
            .transact_write(&operations)
            .map_err(|e| CoreError::execution(change_id, e))?;
        tracing::debug!(
            change_id,
            batch = %batch.id(),
            operations = operations.len(),
            "transaction committed"
        );

        Ok(TransactionOutcome::Committed {
            operations: operations.len(),
            user_operations,
        })
    }
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Detaches the batch from everything that saw it when dropped.
struct TransactionScope<'c> {
    coordinator: &'c TransactionCoordinator,
    batch: Arc<TransactionBatch>,
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        let coordinator = self.coordinator;
        coordinator.ledger.clear_pending_batch();
        coordinator.current.lock().take();
        coordinator.dependencies.unset::<TransactionBatch>();
        tracing::trace!(batch = %self.batch.id(), "transaction closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;
    use crate::entry::StoreEntryLedger;
    use migrun_store::{Document, InMemoryStore, StoreError};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    struct Fixture {
        store: Arc<InMemoryStore>,
        ledger: Arc<StoreEntryLedger>,
        registry: Arc<DependencyRegistry>,
        coordinator: TransactionCoordinator,
    }

    fn fixture(limit: usize) -> Fixture {
        let store = Arc::new(InMemoryStore::with_max_transact_items(limit));
        store
            .ensure_collection("users", &migrun_store::CollectionSpec::new("id"))
            .unwrap();
        let ledger = Arc::new(StoreEntryLedger::open(store.clone(), &RunnerConfig::default()).unwrap());
        let registry = Arc::new(DependencyRegistry::new());
        let coordinator = TransactionCoordinator::new(store.clone(), ledger.clone(), registry.clone());
        Fixture {
            store,
            ledger,
            registry,
            coordinator,
        }
    }

    fn assert_closed(f: &Fixture) {
        assert!(!f.coordinator.is_active());
        assert!(!f.ledger.has_pending_batch());
        assert!(!f.registry.contains::<TransactionBatch>());
    }

    #[test]
    fn empty_body_is_noop() {
        let f = fixture(100);
        let outcome = f.coordinator.run_in_transaction("u1", |_| Ok(())).unwrap();

        assert_eq!(outcome, TransactionOutcome::NoOp);
        assert_closed(&f);
    }

    #[test]
    fn writes_commit_together() {
        let f = fixture(100);
        let outcome = f
            .coordinator
            .run_in_transaction("u1", |ctx| {
                ctx.put("users", "a", Document::new())?;
                ctx.put("users", "b", Document::new())?;
                assert!(f.store.get("users", "a")?.is_none());
                Ok(())
            })
            .unwrap();

        assert_eq!(
            outcome,
            TransactionOutcome::Committed {
                operations: 2,
                user_operations: 2
            }
        );
        assert!(f.store.get("users", "a").unwrap().is_some());
        assert!(f.store.get("users", "b").unwrap().is_some());
        assert_closed(&f);
    }

    #[test]
    fn batch_is_registered_while_in_flight() {
        let f = fixture(100);
        f.coordinator
            .run_in_transaction("u1", |ctx| {
                let registered = ctx.dependency::<TransactionBatch>().expect("batch registered");
                assert_eq!(Some(registered.id()), ctx.batch().map(TransactionBatch::id));
                assert!(ctx
                    .dependencies()
                    .snapshot()
                    .iter()
                    .any(|d| d.is::<TransactionBatch>() && d.is_proxyable()));
                Ok(())
            })
            .unwrap();
        assert_closed(&f);
    }

    #[test]
    fn failing_body_discards_writes() {
        let f = fixture(100);
        let err = f
            .coordinator
            .run_in_transaction("u1", |ctx| {
                ctx.put("users", "a", Document::new())?;
                Err("validation failed".into())
            })
            .unwrap_err();

        match err {
            CoreError::MigrationExecution { change_id, source } => {
                assert_eq!(change_id, "u1");
                assert_eq!(source.to_string(), "validation failed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(f.store.get("users", "a").unwrap().is_none());
        assert_closed(&f);
    }

    #[test]
    fn capacity_error_surfaces_unwrapped() {
        let f = fixture(2);
        let err = f
            .coordinator
            .run_in_transaction("u1", |ctx| {
                for key in ["a", "b", "c"] {
                    ctx.put("users", key, Document::new())?;
                }
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(
            err,
            CoreError::BatchCapacityExceeded {
                limit: 2,
                attempted: 3
            }
        ));
        assert!(f.store.scan("users").unwrap().is_empty());
        assert_closed(&f);
    }

    #[test]
    fn batch_filled_to_limit_commits() {
        let f = fixture(2);
        let outcome = f
            .coordinator
            .run_in_transaction("u1", |ctx| {
                for key in ["a", "b"] {
                    ctx.put("users", key, Document::new())?;
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(
            outcome,
            TransactionOutcome::Committed {
                operations: 2,
                user_operations: 2
            }
        );
        assert_eq!(f.store.scan("users").unwrap().len(), 2);
        assert_closed(&f);
    }

    #[test]
    fn failing_commit_is_wrapped() {
        let f = fixture(100);
        let err = f
            .coordinator
            .run_in_transaction("u1", |ctx| {
                ctx.put("missing", "a", Document::new())?;
                Ok(())
            })
            .unwrap_err();

        match err {
            CoreError::MigrationExecution { source, .. } => {
                assert!(source.downcast_ref::<StoreError>().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_closed(&f);
    }

    #[test]
    fn nested_invocation_is_rejected() {
        let f = fixture(100);
        let err = f
            .coordinator
            .run_in_transaction("outer", |_| {
                f.coordinator.run_in_transaction("inner", |_| Ok(()))?;
                Ok(())
            })
            .unwrap_err();

        match err {
            CoreError::MigrationExecution { source, .. } => {
                let inner = source.downcast_ref::<CoreError>().unwrap();
                assert!(matches!(inner, CoreError::InvalidOperation { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_closed(&f);
    }

    #[test]
    fn panicking_body_still_cleans_up() {
        let f = fixture(100);
        let result = catch_unwind(AssertUnwindSafe(|| {
            f.coordinator
                .run_in_transaction("u1", |_| panic!("unit exploded"))
        }));

        assert!(result.is_err());
        assert_closed(&f);
        assert!(f.coordinator.run_in_transaction("u2", |_| Ok(())).is_ok());
    }

    #[test]
    fn batch_ids_increase() {
        let f = fixture(100);
        let mut seen = Vec::new();
        for unit in ["u1", "u2"] {
            f.coordinator
                .run_in_transaction(unit, |ctx| {
                    seen.push(ctx.batch().map(TransactionBatch::id));
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(seen, [Some(BatchId::new(1)), Some(BatchId::new(2))]);
    }
}
