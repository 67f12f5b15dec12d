//! Lock acquisition, renewal and release.

use crate::clock::Clock;
use crate::config::RunnerConfig;
use crate::error::{CoreError, CoreResult};
use crate::lock::lease::Lease;
use crate::lock::repository::LeaseRepository;
use crate::types::OwnerId;
use migrun_store::{CollectionSpec, DocumentStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Holds the distributed lock on behalf of one runner.
///
/// The manager remembers the last lease it wrote so the runner can decide
/// cheaply whether a renewal is due. The stored record stays authoritative:
/// renewals are conditional on it, so a lease stolen after expiry is noticed
/// on the next write.
pub struct LockManager {
    repository: LeaseRepository,
    clock: Arc<dyn Clock>,
    lock_name: String,
    owner: OwnerId,
    hold_ms: u64,
    give_up_ms: u64,
    poll: Duration,
    refresh_margin_ms: u64,
    current: Mutex<Option<Lease>>,
}

impl LockManager {
    /// Opens a manager with a random owner identity.
    pub fn open(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: &RunnerConfig,
    ) -> CoreResult<Self> {
        Self::with_owner(store, clock, config, OwnerId::random())
    }

    /// Opens a manager acting as `owner`.
    pub fn with_owner(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: &RunnerConfig,
        owner: OwnerId,
    ) -> CoreResult<Self> {
        config.validate()?;
        let spec = CollectionSpec::new("key")
            .create_if_missing(config.index_creation)
            .with_capacity(config.lock_capacity());
        let repository = LeaseRepository::open(store, config.lock_repository_name.clone(), &spec)?;

        Ok(Self {
            repository,
            clock,
            lock_name: config.lock_name.clone(),
            owner,
            hold_ms: config.lock_acquired_for_millis,
            give_up_ms: config.lock_quit_trying_after_millis,
            poll: config.poll_interval(),
            refresh_margin_ms: config.lock_refresh_margin_millis,
            current: Mutex::new(None),
        })
    }

    /// Returns this runner's owner identity.
    #[must_use]
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Returns the name of the managed lock.
    #[must_use]
    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    /// Acquires the lock, polling until the give-up deadline.
    ///
    /// Re-acquiring a lock this runner already owns extends it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockNotAcquired`] when the deadline passes while
    /// another owner holds a live lease. Store failures other than a failed
    /// condition abort immediately.
    pub fn acquire(&self) -> CoreResult<Lease> {
        let started = self.clock.now_ms();
        let give_up = Duration::from_millis(self.give_up_ms);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let now = self.clock.now_ms();
            let lease = self.lease_from(now);

            match self.repository.insert_or_take_over(&lease, now)? {
                Ok(()) => {
                    tracing::info!(
                        lock = %self.lock_name,
                        owner = %self.owner,
                        until = lease.acquired_until_ms,
                        attempts,
                        "lock acquired"
                    );
                    *self.current.lock() = Some(lease.clone());
                    return Ok(lease);
                }
                Err(e) if e.is_condition_failed() => {}
                Err(e) => return Err(e.into()),
            }

            let elapsed = Duration::from_millis(self.clock.now_ms().saturating_sub(started));
            if elapsed >= give_up {
                let holder = self
                    .repository
                    .find(&self.lock_name)
                    .ok()
                    .flatten()
                    .map(|lease| lease.owner);
                tracing::warn!(
                    lock = %self.lock_name,
                    holder = holder.as_deref().unwrap_or("unknown"),
                    attempts,
                    "giving up on lock"
                );
                return Err(CoreError::LockNotAcquired {
                    lock_name: self.lock_name.clone(),
                    waited_ms: elapsed.as_millis() as u64,
                    holder,
                });
            }

            let wait = self.poll.min(give_up - elapsed);
            tracing::debug!(lock = %self.lock_name, wait_ms = wait.as_millis() as u64, "lock busy, retrying");
            self.clock.sleep(wait);
        }
    }

    /// Extends the lease this runner holds by the hold duration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockNotHeld`] if the stored lease has expired or
    /// belongs to someone else.
    pub fn renew(&self) -> CoreResult<Lease> {
        let now = self.clock.now_ms();
        let mut current = self.current.lock();
        let acquired_at = current.as_ref().map_or(now, |lease| lease.acquired_at_ms);
        let lease = Lease::new(
            self.lock_name.clone(),
            self.owner.as_str(),
            acquired_at,
            now.saturating_add(self.hold_ms),
        );

        match self.repository.update_if_owner(&lease, now)? {
            Ok(()) => {
                tracing::debug!(lock = %self.lock_name, until = lease.acquired_until_ms, "lock renewed");
                *current = Some(lease.clone());
                Ok(lease)
            }
            Err(e) if e.is_condition_failed() => {
                *current = None;
                Err(CoreError::LockNotHeld {
                    lock_name: self.lock_name.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Makes sure the lease stays valid for at least the refresh margin.
    ///
    /// Does nothing while enough time is left, renews when the lease is
    /// close to expiry, and acquires again once it has lapsed.
    pub fn ensure_lock(&self) -> CoreResult<Lease> {
        let now = self.clock.now_ms();
        let current = self.current.lock().clone();

        match current {
            Some(lease) if lease.remaining_ms(now) > self.refresh_margin_ms => Ok(lease),
            Some(lease) if !lease.is_expired(now) => self.renew(),
            _ => self.acquire(),
        }
    }

    /// Releases the lock if this runner holds it.
    ///
    /// Best effort: a lease already taken over by someone else is left alone.
    pub fn release(&self) -> CoreResult<()> {
        self.current.lock().take();
        match self
            .repository
            .remove_if_owner(&self.lock_name, self.owner.as_str())
        {
            Ok(()) => {
                tracing::info!(lock = %self.lock_name, owner = %self.owner, "lock released");
                Ok(())
            }
            Err(e) if e.is_condition_failed() => {
                tracing::debug!(lock = %self.lock_name, "lock owned by another runner, not released");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns true while this runner's cached lease has not expired.
    #[must_use]
    pub fn is_held(&self) -> bool {
        let now = self.clock.now_ms();
        self.current
            .lock()
            .as_ref()
            .is_some_and(|lease| !lease.is_expired(now))
    }

    /// Returns the last lease this runner wrote.
    #[must_use]
    pub fn current_lease(&self) -> Option<Lease> {
        self.current.lock().clone()
    }

    /// Reads the stored lease, whoever owns it.
    pub fn lease_info(&self) -> CoreResult<Option<Lease>> {
        self.repository.find(&self.lock_name)
    }

    /// Deletes the stored lease regardless of owner.
    pub fn force_release(&self) -> CoreResult<()> {
        self.current.lock().take();
        self.repository.force_remove(&self.lock_name)?;
        tracing::warn!(lock = %self.lock_name, "lock forcibly released");
        Ok(())
    }

    /// Deletes the stored lease only if it is still `observed`.
    ///
    /// With `expired_by` set, the lease must also have expired by that time.
    /// Returns false, leaving the store untouched, if the lease was renewed,
    /// taken over or removed since it was read.
    pub fn release_observed(&self, observed: &Lease, expired_by: Option<u64>) -> CoreResult<bool> {
        match self.repository.remove_observed(observed, expired_by) {
            Ok(()) => {
                if observed.is_owned_by(self.owner.as_str()) {
                    self.current.lock().take();
                }
                tracing::warn!(lock = %self.lock_name, owner = %observed.owner, "lease removed");
                Ok(true)
            }
            Err(e) if e.is_condition_failed() => {
                tracing::debug!(lock = %self.lock_name, owner = %observed.owner, "lease changed, not removed");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn lease_from(&self, now: u64) -> Lease {
        Lease::new(
            self.lock_name.clone(),
            self.owner.as_str(),
            now,
            now.saturating_add(self.hold_ms),
        )
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("lock_name", &self.lock_name)
            .field("owner", &self.owner)
            .field("collection", &self.repository.collection())
            .finish_non_exhaustive()
    }
}
