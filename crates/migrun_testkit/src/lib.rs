//! # migrun Testkit
//!
//! Test utilities for migrun.
//!
//! This crate provides:
//! - A recording store that captures every atomic write and can inject
//!   commit failures
//! - Ready-made change units and runner fixtures
//! - Property-based test generators using proptest
//! - A contention harness running several runners against one store
//!
//! ## Usage
//!
//! ```rust,ignore
//! use migrun_testkit::prelude::*;
//!
//! #[test]
//! fn unit_commits_once() {
//!     let store = Arc::new(RecordingStore::with_collections(&["users"]));
//!     let mut runner = runner_on(&store, test_config());
//!     runner.register(Box::new(WriteUnit::new("seed", "users", &["a"]))).unwrap();
//!     runner.run().unwrap();
//!     assert_eq!(store.commit_count(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
