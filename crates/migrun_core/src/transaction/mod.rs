//! Transaction management.
//!
//! Each change unit runs against its own [`TransactionBatch`]. Writes issued
//! through the [`ChangeContext`] and the ledger's entry write are queued in
//! the batch and reach the store in a single atomic `transact_write`, or not
//! at all.

mod batch;
mod context;
mod coordinator;

pub use batch::TransactionBatch;
pub use context::ChangeContext;
pub use coordinator::{TransactionCoordinator, TransactionOutcome};
