//! File-based document store shared between processes.

use crate::backend::{CollectionSpec, DocumentStore, DEFAULT_MAX_TRANSACT_ITEMS};
use crate::document::{Condition, Document};
use crate::error::{StoreError, StoreResult};
use crate::operation::WriteOperation;
use crate::tables::Tables;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A document store persisted as a single JSON file.
///
/// Every operation takes an advisory lock on a sidecar `<file>.lock`,
/// reloads the JSON state, applies the operation and, for writes, saves the
/// state with a write-then-rename. Separate processes pointing at the same
/// file therefore observe conditional writes and atomic writes exactly as
/// they would against a remote store.
///
/// # Example
///
/// ```no_run
/// use migrun_store::{CollectionSpec, DocumentStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("migrations.json")).unwrap();
/// store.ensure_collection("migrunLock", &CollectionSpec::new("key")).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    max_transact_items: usize,
}

impl FileStore {
    /// Opens or creates a file store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// existing file is not a valid store.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut lock_name = path.as_os_str().to_os_string();
        lock_name.push(".lock");

        let store = Self {
            path: path.to_path_buf(),
            lock_path: PathBuf::from(lock_name),
            max_transact_items: DEFAULT_MAX_TRANSACT_ITEMS,
        };
        // Validate the existing contents up front.
        store.read(|_| Ok(()))?;
        Ok(store)
    }

    /// Sets the item ceiling for atomic writes.
    #[must_use]
    pub fn with_max_transact_items(mut self, limit: usize) -> Self {
        self.max_transact_items = limit;
        self
    }

    /// Returns the path of the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> StoreResult<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?)
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> StoreResult<R>) -> StoreResult<R> {
        let lock = self.lock_file()?;
        FileExt::lock_shared(&lock)?;
        let tables = self.load()?;
        f(&tables)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<R>) -> StoreResult<R> {
        let lock = self.lock_file()?;
        FileExt::lock_exclusive(&lock)?;
        let mut tables = self.load()?;
        let result = f(&mut tables)?;
        self.save(&tables)?;
        Ok(result)
    }

    fn load(&self) -> StoreResult<Tables> {
        if !self.path.exists() {
            return Ok(Tables::default());
        }
        let data = fs::read(&self.path)?;
        if data.is_empty() {
            return Ok(Tables::default());
        }
        serde_json::from_slice(&data).map_err(|e| {
            StoreError::Corrupted(format!("{}: {e}", self.path.display()))
        })
    }

    fn save(&self, tables: &Tables) -> StoreResult<()> {
        let mut temp_name = self.path.as_os_str().to_os_string();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let data = serde_json::to_vec_pretty(tables)?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl DocumentStore for FileStore {
    fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        self.read(|tables| tables.get(collection, key))
    }

    fn put(
        &self,
        collection: &str,
        key: &str,
        document: Document,
        condition: &Condition,
    ) -> StoreResult<()> {
        self.write(|tables| tables.put(collection, key, document, condition))
    }

    fn delete(&self, collection: &str, key: &str, condition: &Condition) -> StoreResult<()> {
        self.write(|tables| tables.delete(collection, key, condition))
    }

    fn scan(&self, collection: &str) -> StoreResult<Vec<(String, Document)>> {
        self.read(|tables| tables.scan(collection))
    }

    fn transact_write(&self, operations: &[WriteOperation]) -> StoreResult<()> {
        let limit = self.max_transact_items;
        self.write(|tables| tables.transact(operations, limit))
    }

    fn max_transact_items(&self) -> usize {
        self.max_transact_items
    }

    fn ensure_collection(&self, name: &str, spec: &CollectionSpec) -> StoreResult<()> {
        self.write(|tables| tables.ensure(name, spec))
    }
}
