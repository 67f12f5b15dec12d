//! Lease-based distributed lock.
//!
//! Only one runner may apply migrations at a time. Exclusivity comes from a
//! single lease record per lock name, written with conditional puts:
//! - **Acquire**: create the lease if it is absent, expired or already ours
//! - **Renew**: extend the lease only while we still own it
//! - **Release**: delete the lease only if we own it
//!
//! Expiry is time based and assumes roughly synchronized clocks between
//! competing processes. A runner that crashes simply lets its lease expire.

mod lease;
mod manager;
mod repository;

pub use lease::Lease;
pub use manager::LockManager;
pub use repository::LeaseRepository;
