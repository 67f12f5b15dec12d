//! The change log and its store-backed implementation.

use crate::config::RunnerConfig;
use crate::entry::change_entry::ChangeEntry;
use crate::error::CoreResult;
use crate::transaction::TransactionBatch;
use migrun_store::{CollectionSpec, Condition, DocumentStore, WriteOperation};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Persistence for change entries.
///
/// While a batch is attached, entry writes join that batch so they commit
/// atomically with the change unit's own writes.
pub trait EntryLedger: Send + Sync {
    /// Returns true if an `EXECUTED` entry exists for `change_id`.
    fn is_executed(&self, change_id: &str) -> CoreResult<bool>;

    /// Writes `entry` unless the change unit has already executed.
    ///
    /// Returns `false` when an `EXECUTED` entry already exists.
    fn record_if_absent(&self, entry: &ChangeEntry) -> CoreResult<bool>;

    /// Appends `entry` directly, ignoring any attached batch.
    fn record(&self, entry: &ChangeEntry) -> CoreResult<()>;

    /// Lists every entry, oldest first.
    fn entries(&self) -> CoreResult<Vec<ChangeEntry>>;

    /// Routes subsequent entry writes into `batch`.
    fn attach_batch(&self, batch: Arc<TransactionBatch>);

    /// Stops routing entry writes into a batch.
    fn clear_pending_batch(&self);

    /// Returns true while a batch is attached.
    fn has_pending_batch(&self) -> bool;

    /// Ids of every change unit with an `EXECUTED` entry.
    fn executed_change_ids(&self) -> CoreResult<HashSet<String>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(ChangeEntry::is_executed)
            .map(|entry| entry.change_id)
            .collect())
    }
}

/// Entry ledger backed by one collection of a [`DocumentStore`].
pub struct StoreEntryLedger {
    store: Arc<dyn DocumentStore>,
    collection: String,
    pending: Mutex<Option<Arc<TransactionBatch>>>,
}

impl StoreEntryLedger {
    /// Opens the ledger, provisioning its collection.
    pub fn open(store: Arc<dyn DocumentStore>, config: &RunnerConfig) -> CoreResult<Self> {
        let collection = config.migration_repository_name.clone();
        let spec = CollectionSpec::new("key")
            .create_if_missing(config.index_creation)
            .with_capacity(config.capacity);
        store.ensure_collection(&collection, &spec)?;

        Ok(Self {
            store,
            collection,
            pending: Mutex::new(None),
        })
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn insert_operation(&self, entry: &ChangeEntry) -> CoreResult<WriteOperation> {
        Ok(
            WriteOperation::put(&self.collection, entry.key(), entry.to_document()?)
                .with_condition(Condition::NotExists),
        )
    }
}

impl EntryLedger for StoreEntryLedger {
    fn is_executed(&self, change_id: &str) -> CoreResult<bool> {
        for (_, document) in self.store.scan(&self.collection)? {
            let entry = ChangeEntry::from_document(document)?;
            if entry.change_id == change_id && entry.is_executed() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn record_if_absent(&self, entry: &ChangeEntry) -> CoreResult<bool> {
        if self.is_executed(&entry.change_id)? {
            return Ok(false);
        }

        let operation = self.insert_operation(entry)?;
        let batch = self.pending.lock().clone();
        match batch {
            Some(batch) => {
                tracing::debug!(change_id = %entry.change_id, batch = %batch.id(), "entry queued");
                batch.push_ledger(operation)?;
            }
            None => self.store.transact_write(&[operation])?,
        }
        Ok(true)
    }

    fn record(&self, entry: &ChangeEntry) -> CoreResult<()> {
        self.store.put(
            &self.collection,
            &entry.key(),
            entry.to_document()?,
            &Condition::NotExists,
        )?;
        Ok(())
    }

    fn entries(&self) -> CoreResult<Vec<ChangeEntry>> {
        let mut entries = self
            .store
            .scan(&self.collection)?
            .into_iter()
            .map(|(_, document)| ChangeEntry::from_document(document))
            .collect::<CoreResult<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.timestamp_ms);
        Ok(entries)
    }

    fn attach_batch(&self, batch: Arc<TransactionBatch>) {
        *self.pending.lock() = Some(batch);
    }

    fn clear_pending_batch(&self) {
        self.pending.lock().take();
    }

    fn has_pending_batch(&self) -> bool {
        self.pending.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ChangeState;
    use crate::types::{BatchId, ExecutionId};
    use migrun_store::InMemoryStore;

    fn entry(change_id: &str, run: &str, state: ChangeState, at: u64) -> ChangeEntry {
        ChangeEntry::new(ExecutionId::new(run), change_id, "ops", state, at)
    }

    fn ledger() -> (Arc<InMemoryStore>, StoreEntryLedger) {
        let store = Arc::new(InMemoryStore::new());
        let ledger = StoreEntryLedger::open(store.clone(), &RunnerConfig::default()).unwrap();
        (store, ledger)
    }

    #[test]
    fn open_provisions_collection() {
        let (store, ledger) = ledger();
        let spec = store.collection_spec(ledger.collection()).unwrap();
        assert_eq!(spec.key_field, "key");
        assert_eq!(spec.capacity, RunnerConfig::default().capacity);
    }

    #[test]
    fn record_if_absent_writes_directly_without_batch() {
        let (_store, ledger) = ledger();
        let first = entry("u1", "run-1", ChangeState::Executed, 1);

        assert!(ledger.record_if_absent(&first).unwrap());
        assert!(ledger.is_executed("u1").unwrap());
        assert!(!ledger.record_if_absent(&entry("u1", "run-2", ChangeState::Executed, 2)).unwrap());
        assert_eq!(ledger.entries().unwrap(), vec![first]);
    }

    #[test]
    fn failed_entries_do_not_count_as_executed() {
        let (_store, ledger) = ledger();
        ledger
            .record(&entry("u1", "run-1", ChangeState::Failed, 1).with_error("boom"))
            .unwrap();

        assert!(!ledger.is_executed("u1").unwrap());
        assert!(ledger.record_if_absent(&entry("u1", "run-2", ChangeState::Executed, 2)).unwrap());
        assert_eq!(ledger.entries().unwrap().len(), 2);
    }

    #[test]
    fn failure_and_rollback_entries_of_one_run_coexist() {
        let (_store, ledger) = ledger();
        ledger
            .record(&entry("u1", "run-1", ChangeState::Failed, 1).with_error("boom"))
            .unwrap();
        ledger
            .record(&entry("u1", "run-1", ChangeState::RolledBack, 2))
            .unwrap();

        let states: Vec<_> = ledger.entries().unwrap().into_iter().map(|e| e.state).collect();
        assert_eq!(states, [ChangeState::Failed, ChangeState::RolledBack]);
        assert!(!ledger.is_executed("u1").unwrap());
    }

    #[test]
    fn attached_batch_receives_entry_write() {
        let (store, ledger) = ledger();
        let batch = Arc::new(TransactionBatch::new(BatchId::new(1), 10));
        ledger.attach_batch(batch.clone());
        assert!(ledger.has_pending_batch());

        let e = entry("u1", "run-1", ChangeState::Executed, 1);
        assert!(ledger.record_if_absent(&e).unwrap());
        assert!(store.scan(ledger.collection()).unwrap().is_empty());
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.user_operations(), 0);
        assert_eq!(batch.operations()[0].key, e.key());

        ledger.clear_pending_batch();
        assert!(!ledger.has_pending_batch());
    }

    #[test]
    fn entries_sorted_by_timestamp() {
        let (_store, ledger) = ledger();
        ledger.record(&entry("b", "run-1", ChangeState::Executed, 20)).unwrap();
        ledger.record(&entry("a", "run-1", ChangeState::Executed, 10)).unwrap();

        let ids: Vec<_> = ledger
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.change_id)
            .collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(
            ledger.executed_change_ids().unwrap(),
            HashSet::from(["a".to_string(), "b".to_string()])
        );
    }
}
