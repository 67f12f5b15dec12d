//! Status command implementation.

use super::{format_timestamp, open};
use migrun_core::{ChangeEntry, ChangeState, EntryLedger, Lease, RunnerConfig};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Store status.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Store path.
    pub path: String,
    /// Current lease, if any.
    pub lock: Option<Lease>,
    /// Number of executed change units.
    pub executed: usize,
    /// Number of failed attempts.
    pub failed: usize,
    /// Number of rolled back attempts.
    pub rolled_back: usize,
    /// Every change log entry, oldest first.
    pub entries: Vec<ChangeEntry>,
}

/// Collects the status of the store at `path`.
pub fn collect(path: &Path, config: &RunnerConfig) -> Result<StatusResult, Box<dyn std::error::Error>> {
    let handles = open(path, config)?;
    let entries = handles.ledger.entries()?;
    let count = |state: ChangeState| entries.iter().filter(|e| e.state == state).count();

    Ok(StatusResult {
        path: path.display().to_string(),
        lock: handles.lock.lease_info()?,
        executed: count(ChangeState::Executed),
        failed: count(ChangeState::Failed),
        rolled_back: count(ChangeState::RolledBack),
        entries,
    })
}

/// Runs the status command.
pub fn run(path: &Path, config: &RunnerConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("Checking migration status for {:?}", path);
    let result = collect(path, config)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }

    Ok(())
}

fn print_text_output(result: &StatusResult) {
    println!("Migration Status");
    println!("================");
    println!("  Store: {}", result.path);
    match &result.lock {
        Some(lease) => println!(
            "  Lock: held by {} until {}",
            lease.owner,
            format_timestamp(lease.acquired_until_ms)
        ),
        None => println!("  Lock: free"),
    }
    println!("  Executed: {}", result.executed);
    println!("  Failed attempts: {}", result.failed);
    println!("  Rolled back: {}", result.rolled_back);

    if !result.entries.is_empty() {
        println!("\nChange Log:");
        for entry in &result.entries {
            println!(
                "  {} [{}] by {} at {} ({} ms)",
                entry.change_id,
                entry.state,
                entry.author,
                format_timestamp(entry.timestamp_ms),
                entry.execution_millis
            );
            if let Some(error) = &entry.error_message {
                println!("      {}", error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrun_core::ExecutionId;

    #[test]
    fn status_counts_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let config = RunnerConfig::default();

        let handles = open(&path, &config).unwrap();
        let run = ExecutionId::new("run-1");
        handles
            .ledger
            .record(&ChangeEntry::new(run.clone(), "a", "ops", ChangeState::Executed, 1))
            .unwrap();
        handles
            .ledger
            .record(&ChangeEntry::new(run.clone(), "b", "ops", ChangeState::Failed, 2).with_error("boom"))
            .unwrap();
        handles
            .ledger
            .record(&ChangeEntry::new(run, "b", "ops", ChangeState::RolledBack, 3))
            .unwrap();
        handles.lock.acquire().unwrap();

        let status = collect(&path, &config).unwrap();
        assert_eq!(status.executed, 1);
        assert_eq!(status.failed, 1);
        assert_eq!(status.rolled_back, 1);
        assert_eq!(status.entries.len(), 3);
        assert_eq!(
            status.lock.map(|l| l.owner),
            Some(handles.lock.owner().to_string())
        );
    }
}
