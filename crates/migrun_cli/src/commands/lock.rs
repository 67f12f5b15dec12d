//! Lock inspection and recovery commands.

use super::{format_timestamp, open, StoreHandles};
use migrun_core::{Clock, Lease, RunnerConfig, SystemClock};
use std::path::Path;
use tracing::{info, warn};

/// What `unlock` did.
#[derive(Debug, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// There was no lease.
    NotHeld,
    /// The lease was removed.
    Removed {
        /// Owner of the removed lease.
        owner: String,
    },
}

/// Shows the current lease.
pub fn show(path: &Path, config: &RunnerConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let handles = open(path, config)?;
    let lease = handles.lock.lease_info()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&lease)?),
        _ => match lease {
            Some(lease) => {
                let now = SystemClock.now_ms();
                println!("Lock '{}'", lease.lock_name);
                println!("  Owner:    {}", lease.owner);
                println!("  Acquired: {}", format_timestamp(lease.acquired_at_ms));
                println!("  Expires:  {}", format_timestamp(lease.acquired_until_ms));
                if lease.is_expired(now) {
                    println!("  Status:   expired");
                } else {
                    println!("  Status:   held ({} ms left)", lease.remaining_ms(now));
                }
            }
            None => println!("Lock '{}' is free", config.lock_name),
        },
    }

    Ok(())
}

/// Removes the lease, refusing live leases unless `force` is set.
pub fn unlock(path: &Path, config: &RunnerConfig, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let handles = open(path, config)?;
    match unlock_at(&handles, SystemClock.now_ms(), force)? {
        UnlockOutcome::NotHeld => println!("Lock '{}' is free", config.lock_name),
        UnlockOutcome::Removed { owner } => {
            println!("Removed lock '{}' held by {}", config.lock_name, owner)
        }
    }
    Ok(())
}

/// Removes the lease as of `now_ms`.
pub fn unlock_at(
    handles: &StoreHandles,
    now_ms: u64,
    force: bool,
) -> Result<UnlockOutcome, Box<dyn std::error::Error>> {
    match handles.lock.lease_info()? {
        Some(lease) => remove_lease(handles, lease, now_ms, force),
        None => Ok(UnlockOutcome::NotHeld),
    }
}

/// Removes `lease`, as read at `now_ms`, if the store still holds it.
///
/// The delete is conditioned on the lease being unchanged, so a runner that
/// renewed or took it over in the meantime keeps its lease.
pub fn remove_lease(
    handles: &StoreHandles,
    lease: Lease,
    now_ms: u64,
    force: bool,
) -> Result<UnlockOutcome, Box<dyn std::error::Error>> {
    let expired = lease.is_expired(now_ms);
    if !expired {
        if !force {
            return Err(format!(
                "lock '{}' is held by {} for another {} ms; use --force to remove it",
                lease.lock_name,
                lease.owner,
                lease.remaining_ms(now_ms)
            )
            .into());
        }
        warn!(owner = %lease.owner, "removing a live lease");
    }

    let expired_by = expired.then_some(now_ms);
    if !handles.lock.release_observed(&lease, expired_by)? {
        return Err(format!(
            "lock '{}' changed while unlocking; check it and retry",
            lease.lock_name
        )
        .into());
    }
    info!(owner = %lease.owner, "lease removed");
    Ok(UnlockOutcome::Removed { owner: lease.owner })
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrun_core::{LockManager, ManualClock, OwnerId};
    use migrun_store::FileStore;
    use std::sync::Arc;

    fn handles() -> (tempfile::TempDir, StoreHandles) {
        let dir = tempfile::tempdir().unwrap();
        let handles = open(&dir.path().join("store.json"), &RunnerConfig::default()).unwrap();
        (dir, handles)
    }

    #[test]
    fn unlock_without_lease() {
        let (_dir, handles) = handles();
        assert_eq!(unlock_at(&handles, 0, false).unwrap(), UnlockOutcome::NotHeld);
    }

    #[test]
    fn live_lease_needs_force() {
        let (_dir, handles) = handles();
        let lease = handles.lock.acquire().unwrap();
        let now = lease.acquired_at_ms;

        assert!(unlock_at(&handles, now, false).is_err());
        assert!(handles.lock.lease_info().unwrap().is_some());

        let outcome = unlock_at(&handles, now, true).unwrap();
        assert_eq!(
            outcome,
            UnlockOutcome::Removed {
                owner: handles.lock.owner().to_string()
            }
        );
        assert!(handles.lock.lease_info().unwrap().is_none());
    }

    #[test]
    fn lease_taken_over_after_read_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let config = RunnerConfig::default();
        let handles = open(&path, &config).unwrap();
        handles.lock.acquire().unwrap();

        let stale = handles.lock.lease_info().unwrap().unwrap();
        let now = stale.acquired_until_ms;

        // Another runner takes the expired lease over before the delete.
        let store = Arc::new(FileStore::open(&path).unwrap());
        let rival = LockManager::with_owner(
            store,
            Arc::new(ManualClock::new(now)),
            &config,
            OwnerId::new("rival"),
        )
        .unwrap();
        rival.acquire().unwrap();

        let err = remove_lease(&handles, stale, now, false).unwrap_err();
        assert!(err.to_string().contains("changed while unlocking"));
        assert_eq!(handles.lock.lease_info().unwrap().unwrap().owner, "rival");
    }

    #[test]
    fn expired_lease_is_removed_without_force() {
        let (_dir, handles) = handles();
        let lease = handles.lock.acquire().unwrap();

        let outcome = unlock_at(&handles, lease.acquired_until_ms, false).unwrap();
        assert!(matches!(outcome, UnlockOutcome::Removed { .. }));
    }
}
