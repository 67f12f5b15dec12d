//! What a change unit sees while it runs.

use crate::dependency::DependencyRegistry;
use crate::error::CoreResult;
use crate::transaction::batch::TransactionBatch;
use migrun_store::{Document, DocumentStore, WriteOperation};
use std::any::Any;
use std::sync::Arc;

/// Store access and dependencies for one change unit invocation.
///
/// In transactional mode every write is queued into the unit's batch and
/// nothing reaches the store until the unit returns successfully. Without a
/// batch, each write is applied immediately.
///
/// The batch also carries the unit's `EXECUTED` entry, so the runner leaves
/// room for one write below the store's item ceiling.
pub struct ChangeContext<'a> {
    change_id: &'a str,
    store: &'a dyn DocumentStore,
    batch: Option<&'a TransactionBatch>,
    dependencies: &'a DependencyRegistry,
    direct_writes: usize,
}

impl<'a> ChangeContext<'a> {
    /// Creates a context that queues writes into `batch`.
    pub fn transactional(
        change_id: &'a str,
        store: &'a dyn DocumentStore,
        batch: &'a TransactionBatch,
        dependencies: &'a DependencyRegistry,
    ) -> Self {
        Self {
            change_id,
            store,
            batch: Some(batch),
            dependencies,
            direct_writes: 0,
        }
    }

    /// Creates a context that writes straight to the store.
    pub fn direct(
        change_id: &'a str,
        store: &'a dyn DocumentStore,
        dependencies: &'a DependencyRegistry,
    ) -> Self {
        Self {
            change_id,
            store,
            batch: None,
            dependencies,
            direct_writes: 0,
        }
    }

    /// Id of the running change unit.
    #[must_use]
    pub fn change_id(&self) -> &str {
        self.change_id
    }

    /// Returns true if writes are batched.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.batch.is_some()
    }

    /// The batch collecting this unit's writes, if any.
    #[must_use]
    pub fn batch(&self) -> Option<&TransactionBatch> {
        self.batch
    }

    /// Looks up a dependency by type.
    #[must_use]
    pub fn dependency<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.dependencies.get::<T>()
    }

    /// The full dependency registry.
    #[must_use]
    pub fn dependencies(&self) -> &DependencyRegistry {
        self.dependencies
    }

    /// Reads an item.
    ///
    /// Reads go to the store, so they do not see writes queued earlier in
    /// the same batch.
    pub fn get(&self, collection: &str, key: &str) -> CoreResult<Option<Document>> {
        Ok(self.store.get(collection, key)?)
    }

    /// Replaces an item.
    pub fn put(&mut self, collection: &str, key: &str, document: Document) -> CoreResult<()> {
        self.write(WriteOperation::put(collection, key, document))
    }

    /// Merges fields into an item, creating it if absent.
    pub fn update(&mut self, collection: &str, key: &str, fields: Document) -> CoreResult<()> {
        self.write(WriteOperation::update(collection, key, fields))
    }

    /// Removes an item.
    pub fn delete(&mut self, collection: &str, key: &str) -> CoreResult<()> {
        self.write(WriteOperation::delete(collection, key))
    }

    /// Queues or applies an arbitrary write, including conditional ones.
    pub fn write(&mut self, operation: WriteOperation) -> CoreResult<()> {
        match self.batch {
            Some(batch) => batch.push(operation),
            None => {
                self.store.transact_write(std::slice::from_ref(&operation))?;
                self.direct_writes += 1;
                Ok(())
            }
        }
    }

    /// Number of writes this unit issued so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        match self.batch {
            Some(batch) => batch.user_operations(),
            None => self.direct_writes,
        }
    }
}

impl std::fmt::Debug for ChangeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeContext")
            .field("change_id", &self.change_id)
            .field("transactional", &self.is_transactional())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatchId;
    use migrun_store::{Condition, InMemoryStore};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn transactional_writes_are_queued() {
        let store = InMemoryStore::with_collections(&["users"]);
        let registry = DependencyRegistry::new();
        let batch = TransactionBatch::new(BatchId::new(1), 10);
        let mut ctx = ChangeContext::transactional("u1", &store, &batch, &registry);

        ctx.put("users", "a", doc(json!({"n": 1}))).unwrap();
        ctx.update("users", "a", doc(json!({"m": 2}))).unwrap();
        ctx.delete("users", "b").unwrap();

        assert!(ctx.is_transactional());
        assert_eq!(ctx.write_count(), 3);
        assert!(store.get("users", "a").unwrap().is_none());
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn direct_writes_hit_the_store() {
        let store = InMemoryStore::with_collections(&["users"]);
        let registry = DependencyRegistry::new();
        let mut ctx = ChangeContext::direct("u1", &store, &registry);

        ctx.put("users", "a", doc(json!({"n": 1}))).unwrap();
        assert!(!ctx.is_transactional());
        assert_eq!(ctx.write_count(), 1);
        assert_eq!(ctx.get("users", "a").unwrap().unwrap()["n"], 1);

        let conditional = WriteOperation::delete("users", "a")
            .with_condition(Condition::field_equals("n", 2));
        assert!(ctx.write(conditional).is_err());
        assert_eq!(ctx.write_count(), 1);
    }

    #[test]
    fn dependencies_are_visible() {
        let store = InMemoryStore::new();
        let registry = DependencyRegistry::new();
        registry.set(Arc::new(String::from("tenant-a")), false);
        let ctx = ChangeContext::direct("u1", &store, &registry);

        assert_eq!(ctx.dependency::<String>().as_deref().map(String::as_str), Some("tenant-a"));
        assert!(ctx.dependency::<u32>().is_none());
    }
}
