//! # migrun Core
//!
//! Execution core of the migration runner.
//!
//! This crate provides:
//! - A lease-based distributed lock so only one runner applies migrations
//! - A per-change-unit transaction coordinator that commits each unit's
//!   writes as one atomic batch
//! - The change ledger recording which units have executed
//! - A typed dependency registry exposing contextual values to change units
//! - The migration runner tying them together
//!
//! ## Example
//!
//! ```rust
//! use migrun_core::{BoxError, ChangeContext, ChangeUnit, MigrationRunner, RunnerConfig};
//! use migrun_store::{CollectionSpec, DocumentStore, InMemoryStore};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct SeedAdmin;
//!
//! impl ChangeUnit for SeedAdmin {
//!     fn id(&self) -> &str {
//!         "seed-admin"
//!     }
//!
//!     fn execute(&self, ctx: &mut ChangeContext<'_>) -> Result<(), BoxError> {
//!         let doc = json!({"role": "admin"}).as_object().cloned().unwrap_or_default();
//!         ctx.put("users", "admin", doc)?;
//!         Ok(())
//!     }
//! }
//!
//! let store = Arc::new(InMemoryStore::new());
//! store.ensure_collection("users", &CollectionSpec::new("id")).unwrap();
//!
//! let mut runner = MigrationRunner::new(RunnerConfig::default(), store.clone()).unwrap();
//! runner.register(Box::new(SeedAdmin)).unwrap();
//! let report = runner.run().unwrap();
//! assert_eq!(report.applied_count(), 1);
//! assert!(store.get("users", "admin").unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod dependency;
pub mod entry;
mod error;
pub mod lock;
pub mod migration;
pub mod transaction;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RunnerConfig;
pub use dependency::{Dependency, DependencyRegistry};
pub use entry::{ChangeEntry, ChangeState, EntryLedger, StoreEntryLedger};
pub use error::{BoxError, CoreError, CoreResult};
pub use lock::{Lease, LeaseRepository, LockManager};
pub use migration::{ChangeUnit, MigrationReport, MigrationRunner, UnitOutcome, UnitReport};
pub use transaction::{ChangeContext, TransactionBatch, TransactionCoordinator, TransactionOutcome};
pub use types::{BatchId, ExecutionId, OwnerId};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
