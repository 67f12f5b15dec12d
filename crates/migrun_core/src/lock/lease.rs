//! The lease record.

use crate::error::CoreResult;
use crate::types::{decode_document, encode_document};
use migrun_store::Document;
use serde::{Deserialize, Serialize};

/// Status value written on every held lease.
pub(crate) const LOCK_HELD: &str = "LOCK_HELD";

/// A time-bounded claim on a named lock.
///
/// The owner holds the lock for `[acquired_at_ms, acquired_until_ms)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Name of the lock.
    #[serde(rename = "key")]
    pub lock_name: String,
    /// Runner that holds the lease.
    pub owner: String,
    /// Always `LOCK_HELD` for stored leases.
    pub status: String,
    /// When the lease was first acquired (ms since epoch).
    #[serde(rename = "acquiredAt")]
    pub acquired_at_ms: u64,
    /// When the lease stops being valid (ms since epoch).
    #[serde(rename = "expiresAt")]
    pub acquired_until_ms: u64,
}

impl Lease {
    /// Document field holding the owner.
    pub(crate) const OWNER_FIELD: &'static str = "owner";
    /// Document field holding the expiry.
    pub(crate) const EXPIRES_AT_FIELD: &'static str = "expiresAt";

    /// Creates a held lease.
    pub fn new(
        lock_name: impl Into<String>,
        owner: impl Into<String>,
        acquired_at_ms: u64,
        acquired_until_ms: u64,
    ) -> Self {
        Self {
            lock_name: lock_name.into(),
            owner: owner.into(),
            status: LOCK_HELD.to_string(),
            acquired_at_ms,
            acquired_until_ms,
        }
    }

    /// Returns true once `now_ms` reaches the end of the lease.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.acquired_until_ms
    }

    /// Milliseconds left before expiry, zero if already expired.
    #[must_use]
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.acquired_until_ms.saturating_sub(now_ms)
    }

    /// Returns true if `owner` holds this lease.
    #[must_use]
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }

    pub(crate) fn to_document(&self) -> CoreResult<Document> {
        encode_document(self)
    }

    pub(crate) fn from_document(document: Document) -> CoreResult<Self> {
        decode_document(document)
    }
}
