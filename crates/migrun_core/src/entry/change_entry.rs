//! Change log entries.

use crate::error::CoreResult;
use crate::types::{decode_document, encode_document, ExecutionId};
use migrun_store::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome recorded for a change unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeState {
    /// The unit ran and its writes were committed.
    Executed,
    /// The unit's effects were rolled back.
    RolledBack,
    /// The unit failed.
    Failed,
    /// The unit failed and so did its rollback.
    RollbackFailed,
}

impl fmt::Display for ChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Executed => "EXECUTED",
            Self::RolledBack => "ROLLED_BACK",
            Self::Failed => "FAILED",
            Self::RollbackFailed => "ROLLBACK_FAILED",
        })
    }
}

/// One record in the change log.
///
/// Entries are only ever appended. A unit that ran several times (because
/// it failed first, or runs always) has several entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    /// Run that produced this entry.
    pub execution_id: ExecutionId,
    /// The change unit.
    pub change_id: String,
    /// Author of the change unit.
    pub author: String,
    /// Recorded outcome.
    pub state: ChangeState,
    /// When the entry was written (ms since epoch).
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    /// How long the unit body ran.
    pub execution_millis: u64,
    /// Service that ran the unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_identifier: Option<String>,
    /// Failure message for `FAILED` and `ROLLBACK_FAILED` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ChangeEntry {
    /// Creates an entry.
    pub fn new(
        execution_id: ExecutionId,
        change_id: impl Into<String>,
        author: impl Into<String>,
        state: ChangeState,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            execution_id,
            change_id: change_id.into(),
            author: author.into(),
            state,
            timestamp_ms,
            execution_millis: 0,
            service_identifier: None,
            error_message: None,
        }
    }

    /// Sets the body duration.
    #[must_use]
    pub fn with_execution_millis(mut self, millis: u64) -> Self {
        self.execution_millis = millis;
        self
    }

    /// Sets the service identifier.
    #[must_use]
    pub fn with_service_identifier(mut self, id: Option<String>) -> Self {
        self.service_identifier = id;
        self
    }

    /// Sets the failure message.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Document key: unique per change unit, run and state.
    ///
    /// A unit that fails and is then rolled back in one run gets two entries.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}#{}#{}", self.change_id, self.execution_id, self.state)
    }

    /// Returns true for `EXECUTED` entries.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.state == ChangeState::Executed
    }

    pub(crate) fn to_document(&self) -> CoreResult<Document> {
        encode_document(self)
    }

    pub(crate) fn from_document(document: Document) -> CoreResult<Self> {
        decode_document(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_combines_change_execution_and_state() {
        let entry = ChangeEntry::new(
            ExecutionId::new("run-1"),
            "add-index",
            "ops",
            ChangeState::Executed,
            5,
        );
        assert_eq!(entry.key(), "add-index#run-1#EXECUTED");
    }

    #[test]
    fn document_layout() {
        let entry = ChangeEntry::new(
            ExecutionId::new("run-1"),
            "add-index",
            "ops",
            ChangeState::Failed,
            5,
        )
        .with_execution_millis(12)
        .with_error("boom");

        let doc = entry.to_document().unwrap();
        assert_eq!(doc["executionId"], "run-1");
        assert_eq!(doc["changeId"], "add-index");
        assert_eq!(doc["state"], "FAILED");
        assert_eq!(doc["timestamp"], 5);
        assert_eq!(doc["executionMillis"], 12);
        assert_eq!(doc["errorMessage"], "boom");
        assert!(!doc.contains_key("serviceIdentifier"));

        assert_eq!(ChangeEntry::from_document(doc).unwrap(), entry);
    }

    #[test]
    fn state_display_matches_wire_format() {
        for state in [
            ChangeState::Executed,
            ChangeState::RolledBack,
            ChangeState::Failed,
            ChangeState::RollbackFailed,
        ] {
            let wire = serde_json::to_value(state).unwrap();
            assert_eq!(wire, state.to_string());
        }
    }
}
