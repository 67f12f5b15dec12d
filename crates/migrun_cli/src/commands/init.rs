//! Init command implementation.

use super::{entry_count, open};
use migrun_core::RunnerConfig;
use std::path::Path;
use tracing::info;

/// Provisions the lock and change log collections in the store at `path`.
pub fn run(path: &Path, config: &RunnerConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Initializing store at {:?}", path);

    let handles = open(path, config)?;
    let entries = entry_count(&handles.ledger)?;

    println!("Initialized {}", path.display());
    println!("  Lock collection:       {}", config.lock_repository_name);
    println!("  Change log collection: {}", config.migration_repository_name);
    println!("  Existing entries:      {}", entries);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrun_store::{DocumentStore, FileStore};

    #[test]
    fn init_creates_collections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let config = RunnerConfig::default();

        run(&path, &config).unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(store.scan(&config.lock_repository_name).unwrap().is_empty());
        assert!(store.scan(&config.migration_repository_name).unwrap().is_empty());
    }

    #[test]
    fn init_respects_disabled_index_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let config = RunnerConfig::default().index_creation(false);

        assert!(run(&path, &config).is_err());
    }
}
