//! Lease persistence on top of a document store.

use crate::error::CoreResult;
use crate::lock::lease::Lease;
use migrun_store::{CollectionSpec, Condition, DocumentStore, StoreResult};
use std::sync::Arc;

/// Reads and conditionally writes lease records in one collection.
///
/// Write methods surface `StoreError::ConditionFailed` unchanged so the
/// caller can tell contention apart from real store failures.
pub struct LeaseRepository {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl LeaseRepository {
    /// Opens the repository, provisioning its collection per `spec`.
    pub fn open(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        spec: &CollectionSpec,
    ) -> CoreResult<Self> {
        let collection = collection.into();
        store.ensure_collection(&collection, spec)?;
        Ok(Self { store, collection })
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Reads the lease for `lock_name`.
    pub fn find(&self, lock_name: &str) -> CoreResult<Option<Lease>> {
        self.store
            .get(&self.collection, lock_name)?
            .map(Lease::from_document)
            .transpose()
    }

    /// Writes `lease` if the current one is absent, expired at `now_ms`, or
    /// already owned by the same runner.
    pub fn insert_or_take_over(&self, lease: &Lease, now_ms: u64) -> CoreResult<StoreResult<()>> {
        let condition = Condition::Any(vec![
            Condition::NotExists,
            Condition::field_at_most(Lease::EXPIRES_AT_FIELD, to_i64(now_ms)),
            Condition::field_equals(Lease::OWNER_FIELD, lease.owner.as_str()),
        ]);
        self.write(lease, &condition)
    }

    /// Writes `lease` only if the same runner owns an unexpired lease.
    pub fn update_if_owner(&self, lease: &Lease, now_ms: u64) -> CoreResult<StoreResult<()>> {
        let condition = Condition::All(vec![
            Condition::field_equals(Lease::OWNER_FIELD, lease.owner.as_str()),
            Condition::field_greater_than(Lease::EXPIRES_AT_FIELD, to_i64(now_ms)),
        ]);
        self.write(lease, &condition)
    }

    /// Deletes the lease if `owner` holds it.
    pub fn remove_if_owner(&self, lock_name: &str, owner: &str) -> StoreResult<()> {
        let condition = Condition::Any(vec![
            Condition::NotExists,
            Condition::field_equals(Lease::OWNER_FIELD, owner),
        ]);
        self.store.delete(&self.collection, lock_name, &condition)
    }

    /// Deletes the lease only while it is still exactly `observed`.
    ///
    /// With `expired_by` set, the lease must also have expired by then. A
    /// renewal or takeover since `observed` was read fails the condition.
    pub fn remove_observed(&self, observed: &Lease, expired_by: Option<u64>) -> StoreResult<()> {
        let mut conditions = vec![
            Condition::field_equals(Lease::OWNER_FIELD, observed.owner.as_str()),
            Condition::field_equals(Lease::EXPIRES_AT_FIELD, observed.acquired_until_ms),
        ];
        if let Some(now_ms) = expired_by {
            conditions.push(Condition::field_at_most(Lease::EXPIRES_AT_FIELD, to_i64(now_ms)));
        }
        self.store
            .delete(&self.collection, &observed.lock_name, &Condition::All(conditions))
    }

    /// Deletes the lease whoever holds it.
    ///
    /// Only meant for operators clearing a lease left by a dead runner.
    pub fn force_remove(&self, lock_name: &str) -> StoreResult<()> {
        self.store
            .delete(&self.collection, lock_name, &Condition::Always)
    }

    fn write(&self, lease: &Lease, condition: &Condition) -> CoreResult<StoreResult<()>> {
        let document = lease.to_document()?;
        Ok(self
            .store
            .put(&self.collection, &lease.lock_name, document, condition))
    }
}

fn to_i64(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}
