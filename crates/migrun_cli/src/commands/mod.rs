//! CLI command implementations.

pub mod init;
pub mod lock;
pub mod status;

use migrun_core::{EntryLedger, LockManager, RunnerConfig, StoreEntryLedger, SystemClock};
use migrun_store::FileStore;
use std::path::Path;
use std::sync::Arc;

/// Loads the runner configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<RunnerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(RunnerConfig::from_json_file(path)?),
        None => Ok(RunnerConfig::default()),
    }
}

/// Handles onto an existing store.
pub struct StoreHandles {
    /// The change log.
    pub ledger: StoreEntryLedger,
    /// The lock, acting as a fresh owner.
    pub lock: LockManager,
}

/// Opens the store at `path` with the collections `config` names.
pub fn open(path: &Path, config: &RunnerConfig) -> Result<StoreHandles, Box<dyn std::error::Error>> {
    let store = Arc::new(FileStore::open(path)?);
    let ledger = StoreEntryLedger::open(store.clone(), config)?;
    let lock = LockManager::open(store, Arc::new(SystemClock), config)?;
    Ok(StoreHandles { ledger, lock })
}

/// Formats a millisecond timestamp for display.
pub fn format_timestamp(ms: u64) -> String {
    let secs = ms / 1000;
    let millis = ms % 1000;
    format!("{secs}.{millis:03}s since epoch")
}

/// Number of change log entries, for log lines.
pub fn entry_count(ledger: &dyn EntryLedger) -> Result<usize, Box<dyn std::error::Error>> {
    Ok(ledger.entries()?.len())
}
