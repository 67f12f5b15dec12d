//! In-memory document store for testing.

use crate::backend::{CollectionSpec, DocumentStore, DEFAULT_MAX_TRANSACT_ITEMS};
use crate::document::{Condition, Document};
use crate::error::StoreResult;
use crate::operation::WriteOperation;
use crate::tables::Tables;
use parking_lot::RwLock;

/// An in-memory document store.
///
/// This store keeps all collections in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Dry runs that should not touch a real store
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads. Every
/// operation, including `transact_write`, runs under a single lock and is
/// therefore atomic with respect to other callers.
///
/// # Example
///
/// ```rust
/// use migrun_store::{CollectionSpec, Condition, DocumentStore, InMemoryStore};
/// use serde_json::json;
///
/// let store = InMemoryStore::new();
/// store.ensure_collection("locks", &CollectionSpec::new("key")).unwrap();
/// let doc = json!({"owner": "a"}).as_object().unwrap().clone();
/// store.put("locks", "main", doc, &Condition::NotExists).unwrap();
/// assert!(store.get("locks", "main").unwrap().is_some());
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    max_transact_items: usize,
}

impl InMemoryStore {
    /// Creates a new empty store with the default item ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_transact_items(DEFAULT_MAX_TRANSACT_ITEMS)
    }

    /// Creates a new empty store with a custom item ceiling.
    #[must_use]
    pub fn with_max_transact_items(limit: usize) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            max_transact_items: limit,
        }
    }

    /// Creates a store with the given collections already provisioned.
    ///
    /// Useful for tests whose change units write to their own collections.
    #[must_use]
    pub fn with_collections(names: &[&str]) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.write();
            for name in names {
                // A freshly created collection with create_if_missing never fails.
                let _ = tables.ensure(name, &CollectionSpec::new("key"));
            }
        }
        store
    }

    /// Returns the provisioning spec recorded for a collection.
    #[must_use]
    pub fn collection_spec(&self, name: &str) -> Option<CollectionSpec> {
        self.tables.read().spec(name).cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryStore {
    fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        self.tables.read().get(collection, key)
    }

    fn put(
        &self,
        collection: &str,
        key: &str,
        document: Document,
        condition: &Condition,
    ) -> StoreResult<()> {
        self.tables.write().put(collection, key, document, condition)
    }

    fn delete(&self, collection: &str, key: &str, condition: &Condition) -> StoreResult<()> {
        self.tables.write().delete(collection, key, condition)
    }

    fn scan(&self, collection: &str) -> StoreResult<Vec<(String, Document)>> {
        self.tables.read().scan(collection)
    }

    fn transact_write(&self, operations: &[WriteOperation]) -> StoreResult<()> {
        self.tables
            .write()
            .transact(operations, self.max_transact_items)
    }

    fn max_transact_items(&self) -> usize {
        self.max_transact_items
    }

    fn ensure_collection(&self, name: &str, spec: &CollectionSpec) -> StoreResult<()> {
        self.tables.write().ensure(name, spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn store() -> InMemoryStore {
        InMemoryStore::with_collections(&["items", "other"])
    }

    #[test]
    fn memory_new_has_no_collections() {
        let store = InMemoryStore::new();
        let result = store.get("items", "k");
        assert!(matches!(result, Err(StoreError::CollectionNotFound(_))));
    }

    #[test]
    fn memory_put_and_get() {
        let store = store();
        store
            .put("items", "k", doc(json!({"v": 1})), &Condition::Always)
            .unwrap();
        assert_eq!(store.get("items", "k").unwrap(), Some(doc(json!({"v": 1}))));
    }

    #[test]
    fn memory_conditional_put_fails_without_change() {
        let store = store();
        store
            .put("items", "k", doc(json!({"v": 1})), &Condition::NotExists)
            .unwrap();

        let result = store.put("items", "k", doc(json!({"v": 2})), &Condition::NotExists);
        assert!(matches!(result, Err(StoreError::ConditionFailed { .. })));
        assert_eq!(store.get("items", "k").unwrap(), Some(doc(json!({"v": 1}))));
    }

    #[test]
    fn memory_conditional_delete() {
        let store = store();
        store
            .put("items", "k", doc(json!({"owner": "a"})), &Condition::Always)
            .unwrap();

        let result = store.delete("items", "k", &Condition::field_equals("owner", "b"));
        assert!(result.unwrap_err().is_condition_failed());

        store
            .delete("items", "k", &Condition::field_equals("owner", "a"))
            .unwrap();
        assert!(store.get("items", "k").unwrap().is_none());
    }

    #[test]
    fn memory_transact_applies_all() {
        let store = store();
        store
            .transact_write(&[
                WriteOperation::put("items", "a", doc(json!({"v": 1}))),
                WriteOperation::put("other", "b", doc(json!({"v": 2}))),
                WriteOperation::update("items", "a", doc(json!({"w": 3}))),
            ])
            .unwrap();

        assert_eq!(
            store.get("items", "a").unwrap(),
            Some(doc(json!({"v": 1, "w": 3})))
        );
        assert!(store.get("other", "b").unwrap().is_some());
    }

    #[test]
    fn memory_transact_is_all_or_nothing() {
        let store = store();
        store
            .put("items", "taken", doc(json!({})), &Condition::Always)
            .unwrap();

        let result = store.transact_write(&[
            WriteOperation::put("items", "a", doc(json!({"v": 1}))),
            WriteOperation::put("items", "taken", doc(json!({"v": 2})))
                .with_condition(Condition::NotExists),
        ]);

        assert!(result.unwrap_err().is_condition_failed());
        assert!(store.get("items", "a").unwrap().is_none());
    }

    #[test]
    fn memory_transact_missing_collection_applies_nothing() {
        let store = store();
        let result = store.transact_write(&[
            WriteOperation::put("items", "a", doc(json!({}))),
            WriteOperation::put("missing", "b", doc(json!({}))),
        ]);

        assert!(matches!(result, Err(StoreError::CollectionNotFound(_))));
        assert!(store.get("items", "a").unwrap().is_none());
    }

    #[test]
    fn memory_transact_rejects_too_many_items() {
        let store = InMemoryStore::with_max_transact_items(2);
        store
            .ensure_collection("items", &CollectionSpec::new("key"))
            .unwrap();

        let ops: Vec<_> = (0..3)
            .map(|i| WriteOperation::put("items", format!("k{i}"), doc(json!({}))))
            .collect();
        let result = store.transact_write(&ops);

        assert!(matches!(
            result,
            Err(StoreError::TooManyItems {
                limit: 2,
                actual: 3
            })
        ));
        assert!(store.scan("items").unwrap().is_empty());
    }

    #[test]
    fn memory_ensure_collection_respects_creation_flag() {
        let store = InMemoryStore::new();
        let spec = CollectionSpec::new("key").create_if_missing(false);
        assert!(matches!(
            store.ensure_collection("locks", &spec),
            Err(StoreError::CollectionNotFound(_))
        ));

        let spec = CollectionSpec::new("key").with_capacity(Some(crate::Capacity::new(1, 1)));
        store.ensure_collection("locks", &spec).unwrap();
        assert_eq!(store.collection_spec("locks"), Some(spec));
    }

    #[test]
    fn memory_scan_is_ordered_by_key() {
        let store = store();
        for key in ["c", "a", "b"] {
            store
                .put("items", key, doc(json!({})), &Condition::Always)
                .unwrap();
        }
        let keys: Vec<_> = store
            .scan("items")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
