//! Write operations submitted to atomic writes.

use crate::document::{Condition, Document};

/// What a write operation does to its target item.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    /// Replace the item with the given document.
    Put(Document),
    /// Merge the given fields into the item, creating it if absent.
    Update(Document),
    /// Remove the item.
    Delete,
}

/// A single write against a named collection and key.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOperation {
    /// Target collection.
    pub collection: String,
    /// Target key.
    pub key: String,
    /// The write to perform.
    pub kind: WriteKind,
    /// Condition that must hold for the whole atomic write to apply.
    pub condition: Condition,
}

impl WriteOperation {
    /// Creates an unconditional put.
    pub fn put(collection: impl Into<String>, key: impl Into<String>, document: Document) -> Self {
        Self::new(collection, key, WriteKind::Put(document))
    }

    /// Creates an unconditional update.
    pub fn update(
        collection: impl Into<String>,
        key: impl Into<String>,
        fields: Document,
    ) -> Self {
        Self::new(collection, key, WriteKind::Update(fields))
    }

    /// Creates an unconditional delete.
    pub fn delete(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(collection, key, WriteKind::Delete)
    }

    fn new(collection: impl Into<String>, key: impl Into<String>, kind: WriteKind) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            kind,
            condition: Condition::Always,
        }
    }

    /// Attaches a condition to this operation.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Returns the item as it looks after this write.
    pub(crate) fn apply(&self, current: Option<Document>) -> Option<Document> {
        match &self.kind {
            WriteKind::Put(document) => Some(document.clone()),
            WriteKind::Update(fields) => {
                let mut merged = current.unwrap_or_default();
                for (name, value) in fields {
                    merged.insert(name.clone(), value.clone());
                }
                Some(merged)
            }
            WriteKind::Delete => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn update_merges_fields() {
        let op = WriteOperation::update("c", "k", doc(json!({"b": 2})));
        let after = op.apply(Some(doc(json!({"a": 1, "b": 1})))).unwrap();
        assert_eq!(after, doc(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn update_creates_missing_item() {
        let op = WriteOperation::update("c", "k", doc(json!({"b": 2})));
        assert_eq!(op.apply(None), Some(doc(json!({"b": 2}))));
    }

    #[test]
    fn delete_removes_item() {
        let op = WriteOperation::delete("c", "k");
        assert_eq!(op.apply(Some(doc(json!({"a": 1})))), None);
    }

    #[test]
    fn default_condition_is_always() {
        let op = WriteOperation::delete("c", "k");
        assert_eq!(op.condition, Condition::Always);
        let op = op.with_condition(Condition::Exists);
        assert_eq!(op.condition, Condition::Exists);
    }
}
