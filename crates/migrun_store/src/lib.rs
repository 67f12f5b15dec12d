//! # migrun Store
//!
//! Document store boundary and implementations for migrun.
//!
//! This crate is the lowest layer of the migration runner. It knows nothing
//! about leases, change entries or change units; it only stores JSON documents
//! in named collections and offers the two primitives the runner builds on:
//!
//! - conditional single-item writes ([`DocumentStore::put`] and
//!   [`DocumentStore::delete`] guarded by a [`Condition`]), used for leases
//! - a bounded, all-or-nothing multi-item write
//!   ([`DocumentStore::transact_write`]), used for per-change-unit batches
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral runs
//! - [`FileStore`] - A JSON file shared between processes through an
//!   advisory file lock
//!
//! ## Example
//!
//! ```rust
//! use migrun_store::{CollectionSpec, Condition, DocumentStore, InMemoryStore, WriteOperation};
//! use serde_json::json;
//!
//! let store = InMemoryStore::new();
//! store.ensure_collection("users", &CollectionSpec::new("id")).unwrap();
//!
//! let ops = vec![
//!     WriteOperation::put("users", "u1", json!({"name": "ada"}).as_object().unwrap().clone()),
//!     WriteOperation::put("users", "u2", json!({"name": "bob"}).as_object().unwrap().clone()),
//! ];
//! store.transact_write(&ops).unwrap();
//! assert_eq!(store.scan("users").unwrap().len(), 2);
//!
//! // A conditional write that does not hold leaves the store untouched.
//! let doc = json!({"name": "eve"}).as_object().unwrap().clone();
//! assert!(store.put("users", "u1", doc, &Condition::NotExists).is_err());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod document;
mod error;
mod file;
mod memory;
mod operation;
mod tables;

pub use backend::{Capacity, CollectionSpec, DocumentStore, DEFAULT_MAX_TRANSACT_ITEMS};
pub use document::{Condition, Document};
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use operation::{WriteKind, WriteOperation};
