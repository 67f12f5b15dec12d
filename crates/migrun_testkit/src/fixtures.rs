//! Test fixtures: an instrumented store, sample change units and runner
//! helpers.

use migrun_core::{BoxError, ChangeContext, ChangeUnit, ManualClock, MigrationRunner, RunnerConfig};
use migrun_store::{
    CollectionSpec, Condition, Document, DocumentStore, FileStore, InMemoryStore, StoreError,
    StoreResult, WriteOperation,
};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// An in-memory store that records every `transact_write` call.
///
/// Failed calls are recorded too, so tests can tell "no commit attempted"
/// apart from "commit attempted and rejected".
#[derive(Debug)]
pub struct RecordingStore {
    inner: InMemoryStore,
    commits: Mutex<Vec<Vec<WriteOperation>>>,
    puts: AtomicUsize,
    fail_commits: AtomicBool,
}

impl RecordingStore {
    /// Wraps an empty store with the default item ceiling.
    pub fn new() -> Self {
        Self::wrap(InMemoryStore::new())
    }

    /// Wraps an empty store with a custom item ceiling.
    pub fn with_max_transact_items(limit: usize) -> Self {
        Self::wrap(InMemoryStore::with_max_transact_items(limit))
    }

    /// Wraps a store with the given collections provisioned.
    pub fn with_collections(names: &[&str]) -> Self {
        Self::wrap(InMemoryStore::with_collections(names))
    }

    fn wrap(inner: InMemoryStore) -> Self {
        Self {
            inner,
            commits: Mutex::new(Vec::new()),
            puts: AtomicUsize::new(0),
            fail_commits: AtomicBool::new(false),
        }
    }

    /// Makes every following `transact_write` fail until reset.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of `transact_write` calls, successful or not.
    pub fn commit_count(&self) -> usize {
        self.commits.lock().len()
    }

    /// Operations of every `transact_write` call, in call order.
    pub fn commits(&self) -> Vec<Vec<WriteOperation>> {
        self.commits.lock().clone()
    }

    /// Number of conditional `put` calls.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Forgets recorded calls.
    pub fn reset(&self) {
        self.commits.lock().clear();
        self.puts.store(0, Ordering::SeqCst);
    }
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for RecordingStore {
    fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        self.inner.get(collection, key)
    }

    fn put(
        &self,
        collection: &str,
        key: &str,
        document: Document,
        condition: &Condition,
    ) -> StoreResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(collection, key, document, condition)
    }

    fn delete(&self, collection: &str, key: &str, condition: &Condition) -> StoreResult<()> {
        self.inner.delete(collection, key, condition)
    }

    fn scan(&self, collection: &str) -> StoreResult<Vec<(String, Document)>> {
        self.inner.scan(collection)
    }

    fn transact_write(&self, operations: &[WriteOperation]) -> StoreResult<()> {
        self.commits.lock().push(operations.to_vec());
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Io(io::Error::other("injected commit failure")));
        }
        self.inner.transact_write(operations)
    }

    fn max_transact_items(&self) -> usize {
        self.inner.max_transact_items()
    }

    fn ensure_collection(&self, name: &str, spec: &CollectionSpec) -> StoreResult<()> {
        self.inner.ensure_collection(name, spec)
    }
}

/// A file-backed store in a temporary directory.
pub struct TempFileStore {
    /// The store.
    pub store: Arc<FileStore>,
    /// Kept alive so the directory outlives the store.
    _temp_dir: TempDir,
}

impl TempFileStore {
    /// Creates an empty file store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(&temp_dir.path().join("store.json"))
            .expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        }
    }
}

impl Default for TempFileStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration suitable for tests on a [`ManualClock`].
///
/// Short lease, short polling, and a give-up deadline of a few polls.
pub fn test_config() -> RunnerConfig {
    RunnerConfig::new()
        .lock_acquired_for(5_000)
        .lock_refresh_margin(1_000)
        .lock_try_frequency(100)
        .lock_quit_trying_after(1_000)
}

/// Builds a runner over `store` on a fresh manual clock.
pub fn runner_on<S>(store: &Arc<S>, config: RunnerConfig) -> MigrationRunner
where
    S: DocumentStore + 'static,
{
    let store: Arc<dyn DocumentStore> = store.clone();
    MigrationRunner::with_clock(config, store, Arc::new(ManualClock::new(1_000)))
        .expect("Failed to build runner")
}

/// Converts a JSON object literal into a document.
pub fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().unwrap_or_default()
}

/// A change unit that puts one empty document per key.
#[derive(Debug, Clone)]
pub struct WriteUnit {
    id: String,
    collection: String,
    keys: Vec<String>,
}

impl WriteUnit {
    /// Creates a unit writing `keys` into `collection`.
    pub fn new(id: impl Into<String>, collection: impl Into<String>, keys: &[&str]) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
        }
    }

    /// Creates a unit writing the given owned keys.
    pub fn with_keys(id: impl Into<String>, collection: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            keys,
        }
    }
}

impl ChangeUnit for WriteUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute(&self, ctx: &mut ChangeContext<'_>) -> Result<(), BoxError> {
        for key in &self.keys {
            ctx.put(&self.collection, key, Document::new())?;
        }
        Ok(())
    }
}

/// A change unit that writes some keys, then fails.
///
/// Fail-fast unless [`FailingUnit::lenient`] is used.
#[derive(Debug, Clone)]
pub struct FailingUnit {
    inner: WriteUnit,
    message: String,
    fail_fast: bool,
}

impl FailingUnit {
    /// Creates a unit that writes `keys` and then fails with `message`.
    pub fn new(
        id: impl Into<String>,
        collection: impl Into<String>,
        keys: &[&str],
        message: impl Into<String>,
    ) -> Self {
        Self {
            inner: WriteUnit::new(id, collection, keys),
            message: message.into(),
            fail_fast: true,
        }
    }

    /// Lets the run continue past this unit's failure.
    #[must_use]
    pub fn lenient(mut self) -> Self {
        self.fail_fast = false;
        self
    }
}

impl ChangeUnit for FailingUnit {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    fn execute(&self, ctx: &mut ChangeContext<'_>) -> Result<(), BoxError> {
        self.inner.execute(ctx)?;
        Err(self.message.clone().into())
    }
}

/// A change unit backed by a closure.
pub struct FnUnit<F> {
    id: String,
    body: F,
}

impl<F> FnUnit<F>
where
    F: Fn(&mut ChangeContext<'_>) -> Result<(), BoxError> + Send + Sync,
{
    /// Creates a unit named `id` running `body`.
    pub fn new(id: impl Into<String>, body: F) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}

impl<F> ChangeUnit for FnUnit<F>
where
    F: Fn(&mut ChangeContext<'_>) -> Result<(), BoxError> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn execute(&self, ctx: &mut ChangeContext<'_>) -> Result<(), BoxError> {
        (self.body)(ctx)
    }
}
