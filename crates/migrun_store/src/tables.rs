//! Collection state shared by the in-memory and file stores.

use crate::backend::CollectionSpec;
use crate::document::{Condition, Document};
use crate::error::{StoreError, StoreResult};
use crate::operation::WriteOperation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One collection: its provisioning spec and its items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Table {
    pub(crate) spec: Option<CollectionSpec>,
    pub(crate) items: BTreeMap<String, Document>,
}

/// All collections of a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Tables {
    collections: BTreeMap<String, Table>,
}

impl Tables {
    pub(crate) fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        Ok(self.table(collection)?.items.get(key).cloned())
    }

    pub(crate) fn put(
        &mut self,
        collection: &str,
        key: &str,
        document: Document,
        condition: &Condition,
    ) -> StoreResult<()> {
        let table = self.table_mut(collection)?;
        if !condition.evaluate(table.items.get(key)) {
            return Err(StoreError::condition_failed(collection, key));
        }
        table.items.insert(key.to_string(), document);
        Ok(())
    }

    pub(crate) fn delete(
        &mut self,
        collection: &str,
        key: &str,
        condition: &Condition,
    ) -> StoreResult<()> {
        let table = self.table_mut(collection)?;
        if !condition.evaluate(table.items.get(key)) {
            return Err(StoreError::condition_failed(collection, key));
        }
        table.items.remove(key);
        Ok(())
    }

    pub(crate) fn scan(&self, collection: &str) -> StoreResult<Vec<(String, Document)>> {
        Ok(self
            .table(collection)?
            .items
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Stages every operation against an overlay, then applies the overlay
    /// only if all of them passed.
    pub(crate) fn transact(&mut self, operations: &[WriteOperation], limit: usize) -> StoreResult<()> {
        if operations.len() > limit {
            return Err(StoreError::TooManyItems {
                limit,
                actual: operations.len(),
            });
        }

        let mut staged: HashMap<(&str, &str), Option<Document>> = HashMap::new();
        for op in operations {
            let table = self.table(&op.collection)?;
            let target = (op.collection.as_str(), op.key.as_str());
            let current = match staged.get(&target) {
                Some(staged_item) => staged_item.clone(),
                None => table.items.get(&op.key).cloned(),
            };
            if !op.condition.evaluate(current.as_ref()) {
                return Err(StoreError::condition_failed(&op.collection, &op.key));
            }
            staged.insert(target, op.apply(current));
        }

        for ((collection, key), item) in staged {
            let table = self.table_mut(collection)?;
            match item {
                Some(document) => {
                    table.items.insert(key.to_string(), document);
                }
                None => {
                    table.items.remove(key);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn ensure(&mut self, name: &str, spec: &CollectionSpec) -> StoreResult<()> {
        if let Some(table) = self.collections.get_mut(name) {
            if table.spec.is_none() {
                table.spec = Some(spec.clone());
            }
            return Ok(());
        }
        if !spec.create_if_missing {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }
        tracing::debug!(collection = name, key_field = %spec.key_field, "creating collection");
        self.collections.insert(
            name.to_string(),
            Table {
                spec: Some(spec.clone()),
                items: BTreeMap::new(),
            },
        );
        Ok(())
    }

    pub(crate) fn spec(&self, name: &str) -> Option<&CollectionSpec> {
        self.collections.get(name).and_then(|t| t.spec.as_ref())
    }

    fn table(&self, name: &str) -> StoreResult<&Table> {
        self.collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> StoreResult<&mut Table> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }
}
