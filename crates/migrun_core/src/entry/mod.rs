//! The change log.
//!
//! Every attempt to run a change unit leaves an entry. A unit counts as
//! applied once an `EXECUTED` entry exists for its id.

mod change_entry;
mod ledger;

pub use change_entry::{ChangeEntry, ChangeState};
pub use ledger::{EntryLedger, StoreEntryLedger};
