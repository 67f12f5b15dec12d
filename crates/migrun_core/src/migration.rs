//! Change units and the runner that applies them.
//!
//! ## Design Philosophy
//!
//! Change units are:
//! - **Registered explicitly**: units run in registration order
//! - **Applied once**: a unit with an `EXECUTED` entry is skipped unless it
//!   asks to run always
//! - **Atomic**: a unit's writes and its ledger entry commit together
//! - **Fail-fast by default**: a failing unit stops the run unless it opts
//!   out. Without transactions, a failed unit gets a chance to roll back
//!
//! ## Usage
//!
//! ```ignore
//! let mut runner = MigrationRunner::new(RunnerConfig::default(), store)?;
//! runner.register(Box::new(SeedAdmin))?;
//! let report = runner.run()?;
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::RunnerConfig;
use crate::dependency::DependencyRegistry;
use crate::entry::{ChangeEntry, ChangeState, EntryLedger, StoreEntryLedger};
use crate::error::{BoxError, CoreError, CoreResult};
use crate::lock::LockManager;
use crate::transaction::{ChangeContext, TransactionCoordinator, TransactionOutcome};
use crate::types::ExecutionId;
use migrun_store::DocumentStore;
use std::sync::Arc;

/// A unit of change applied at most once.
///
/// With transactions enabled, the unit's writes and its `EXECUTED` entry go
/// into one atomic batch, so a unit may queue at most
/// `max_transact_items - 1` writes of its own.
pub trait ChangeUnit: Send + Sync {
    /// Unique id of this unit.
    fn id(&self) -> &str;

    /// Author recorded on its entries. Falls back to the configured default.
    fn author(&self) -> Option<&str> {
        None
    }

    /// Whether to run on every run, even when already executed.
    fn run_always(&self) -> bool {
        false
    }

    /// Whether a failure of this unit stops the run.
    ///
    /// When false, the failure is recorded and the run moves on to the next
    /// unit.
    fn fail_fast(&self) -> bool {
        true
    }

    /// Applies the change.
    fn execute(&self, ctx: &mut ChangeContext<'_>) -> Result<(), BoxError>;

    /// Undoes a failed [`execute`](ChangeUnit::execute).
    ///
    /// Only called when transactions are disabled, with a context that writes
    /// straight to the store. Returns `Ok(false)` if the unit has nothing to
    /// undo, which is the default.
    fn rollback(&self, _ctx: &mut ChangeContext<'_>) -> Result<bool, BoxError> {
        Ok(false)
    }
}

/// What happened to one change unit during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The unit ran and its writes were committed.
    Applied {
        /// Operations written, ledger entry included.
        operations: usize,
    },
    /// The unit ran but nothing needed writing.
    NoOp,
    /// The unit had already executed.
    Skipped,
    /// The unit failed.
    Failed {
        /// Failure message.
        error: String,
    },
}

/// Per-unit line of a [`MigrationReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    /// The change unit.
    pub change_id: String,
    /// What happened.
    pub outcome: UnitOutcome,
    /// Time spent on the unit.
    pub elapsed_ms: u64,
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Id shared by every entry this run wrote.
    pub execution_id: ExecutionId,
    /// Units in the order they were visited.
    pub units: Vec<UnitReport>,
}

impl MigrationReport {
    fn new(execution_id: ExecutionId) -> Self {
        Self {
            execution_id,
            units: Vec::new(),
        }
    }

    fn count(&self, matches: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.units.iter().filter(|u| matches(&u.outcome)).count()
    }

    /// Number of units whose writes were committed.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Applied { .. }))
    }

    /// Number of units that ran without writing anything.
    #[must_use]
    pub fn noop_count(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::NoOp))
    }

    /// Number of units skipped as already executed.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Skipped))
    }

    /// Number of failed units.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Failed { .. }))
    }

    /// Returns true if no unit failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Applies registered change units under the distributed lock.
pub struct MigrationRunner {
    config: RunnerConfig,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    ledger: Arc<dyn EntryLedger>,
    lock: LockManager,
    dependencies: Arc<DependencyRegistry>,
    coordinator: TransactionCoordinator,
    units: Vec<Box<dyn ChangeUnit>>,
    last_report: Option<MigrationReport>,
}

impl MigrationRunner {
    /// Creates a runner on the system clock.
    pub fn new(config: RunnerConfig, store: Arc<dyn DocumentStore>) -> CoreResult<Self> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Creates a runner on `clock`.
    ///
    /// Provisions the lock and entry collections.
    pub fn with_clock(
        config: RunnerConfig,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let ledger: Arc<dyn EntryLedger> =
            Arc::new(StoreEntryLedger::open(Arc::clone(&store), &config)?);
        let lock = LockManager::open(Arc::clone(&store), Arc::clone(&clock), &config)?;
        let dependencies = Arc::new(DependencyRegistry::new());
        let coordinator = TransactionCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&dependencies),
        );

        Ok(Self {
            config,
            store,
            clock,
            ledger,
            lock,
            dependencies,
            coordinator,
            units: Vec::new(),
            last_report: None,
        })
    }

    /// Adds a change unit after those already registered.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateChangeUnit`] if the id is taken.
    pub fn register(&mut self, unit: Box<dyn ChangeUnit>) -> CoreResult<()> {
        if self.units.iter().any(|u| u.id() == unit.id()) {
            return Err(CoreError::DuplicateChangeUnit {
                change_id: unit.id().to_string(),
            });
        }
        self.units.push(unit);
        Ok(())
    }

    /// Ids of registered units, in run order.
    #[must_use]
    pub fn change_ids(&self) -> Vec<String> {
        self.units.iter().map(|u| u.id().to_string()).collect()
    }

    /// Ids of registered units without an `EXECUTED` entry, in run order.
    pub fn pending(&self) -> CoreResult<Vec<String>> {
        let executed = self.ledger.executed_change_ids()?;
        Ok(self
            .units
            .iter()
            .filter(|u| !executed.contains(u.id()))
            .map(|u| u.id().to_string())
            .collect())
    }

    /// Runs every pending unit under the lock.
    ///
    /// When no unit is pending (and none runs always) the lock is not taken
    /// and every unit is reported as skipped.
    ///
    /// Stops at the first failing fail-fast unit, after recording a `FAILED`
    /// entry for it. The lock is released on every path. The report of a
    /// failed run stays available through [`MigrationRunner::last_report`].
    ///
    /// # Errors
    ///
    /// Returns the lock error if the lock cannot be acquired, or the error of
    /// the failing unit.
    pub fn run(&mut self) -> CoreResult<MigrationReport> {
        let mut report = MigrationReport::new(ExecutionId::random());
        if !self.has_pending_work()? {
            tracing::info!(
                execution = %report.execution_id,
                units = self.units.len(),
                "nothing to migrate, lock not taken"
            );
            report.units = self
                .units
                .iter()
                .map(|u| UnitReport {
                    change_id: u.id().to_string(),
                    outcome: UnitOutcome::Skipped,
                    elapsed_ms: 0,
                })
                .collect();
            self.last_report = Some(report.clone());
            return Ok(report);
        }

        tracing::info!(
            execution = %report.execution_id,
            units = self.units.len(),
            "migration run started"
        );
        self.lock.acquire()?;
        let result = self.run_units(&mut report);
        if let Err(e) = self.lock.release() {
            tracing::warn!(error = %e, "failed to release migration lock");
        }

        tracing::info!(
            execution = %report.execution_id,
            applied = report.applied_count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            "migration run finished"
        );
        self.last_report = Some(report.clone());
        result.map(|()| report)
    }

    fn has_pending_work(&self) -> CoreResult<bool> {
        let executed = self.ledger.executed_change_ids()?;
        Ok(self
            .units
            .iter()
            .any(|u| u.run_always() || !executed.contains(u.id())))
    }

    fn run_units(&self, report: &mut MigrationReport) -> CoreResult<()> {
        for unit in &self.units {
            self.lock.ensure_lock()?;

            let change_id = unit.id();
            let started = self.clock.now_ms();
            if !unit.run_always() && self.ledger.is_executed(change_id)? {
                tracing::debug!(change_id, "already executed, skipping");
                report.units.push(UnitReport {
                    change_id: change_id.to_string(),
                    outcome: UnitOutcome::Skipped,
                    elapsed_ms: 0,
                });
                continue;
            }

            let author = unit.author().unwrap_or(&self.config.default_author);
            let result = if self.config.transaction_enabled {
                self.coordinator.run_in_transaction(change_id, |ctx| {
                    unit.execute(ctx)?;
                    self.record_executed(&report.execution_id, change_id, author, started)?;
                    Ok(())
                })
            } else {
                self.run_direct(unit.as_ref(), &report.execution_id, author, started)
            };
            let elapsed_ms = self.clock.now_ms().saturating_sub(started);

            match result {
                Ok(outcome) => {
                    let outcome = match outcome {
                        TransactionOutcome::Committed { operations, .. } => {
                            UnitOutcome::Applied { operations }
                        }
                        TransactionOutcome::NoOp => UnitOutcome::NoOp,
                    };
                    tracing::info!(change_id, elapsed_ms, "change unit applied");
                    report.units.push(UnitReport {
                        change_id: change_id.to_string(),
                        outcome,
                        elapsed_ms,
                    });
                }
                Err(e) => {
                    tracing::error!(change_id, error = %e, "change unit failed");
                    let entry = self
                        .entry(&report.execution_id, change_id, author, ChangeState::Failed)
                        .with_execution_millis(elapsed_ms)
                        .with_error(e.to_string());
                    self.record_entry(&entry);
                    if !self.config.transaction_enabled {
                        self.roll_back(unit.as_ref(), &report.execution_id, author);
                    }

                    report.units.push(UnitReport {
                        change_id: change_id.to_string(),
                        outcome: UnitOutcome::Failed {
                            error: e.to_string(),
                        },
                        elapsed_ms,
                    });
                    if unit.fail_fast() {
                        return Err(e);
                    }
                    tracing::warn!(change_id, "unit is not fail-fast, continuing");
                }
            }
        }
        Ok(())
    }

    fn run_direct(
        &self,
        unit: &dyn ChangeUnit,
        execution_id: &ExecutionId,
        author: &str,
        started: u64,
    ) -> CoreResult<TransactionOutcome> {
        let change_id = unit.id();
        let mut ctx = ChangeContext::direct(change_id, self.store.as_ref(), &self.dependencies);
        unit.execute(&mut ctx)
            .map_err(|e| CoreError::from_body(change_id, e))?;
        let user_operations = ctx.write_count();

        let recorded = self.record_executed(execution_id, change_id, author, started)?;
        let operations = user_operations + usize::from(recorded);
        if operations == 0 {
            return Ok(TransactionOutcome::NoOp);
        }
        Ok(TransactionOutcome::Committed {
            operations,
            user_operations,
        })
    }

    fn roll_back(&self, unit: &dyn ChangeUnit, execution_id: &ExecutionId, author: &str) {
        let change_id = unit.id();
        let started = self.clock.now_ms();
        let mut ctx = ChangeContext::direct(change_id, self.store.as_ref(), &self.dependencies);

        let entry = match unit.rollback(&mut ctx) {
            Ok(false) => return,
            Ok(true) => {
                tracing::info!(change_id, "change unit rolled back");
                self.entry(execution_id, change_id, author, ChangeState::RolledBack)
            }
            Err(e) => {
                tracing::error!(change_id, error = %e, "rollback failed");
                self.entry(execution_id, change_id, author, ChangeState::RollbackFailed)
                    .with_error(e.to_string())
            }
        };
        let elapsed_ms = entry.timestamp_ms.saturating_sub(started);
        self.record_entry(&entry.with_execution_millis(elapsed_ms));
    }

    fn record_executed(
        &self,
        execution_id: &ExecutionId,
        change_id: &str,
        author: &str,
        started: u64,
    ) -> CoreResult<bool> {
        let entry = self.entry(execution_id, change_id, author, ChangeState::Executed);
        let elapsed_ms = entry.timestamp_ms.saturating_sub(started);
        self.ledger
            .record_if_absent(&entry.with_execution_millis(elapsed_ms))
    }

    /// Appends an entry outside any batch; failures are only logged.
    fn record_entry(&self, entry: &ChangeEntry) {
        if let Err(e) = self.ledger.record(entry) {
            tracing::warn!(
                change_id = %entry.change_id,
                state = %entry.state,
                error = %e,
                "failed to record entry"
            );
        }
    }

    fn entry(
        &self,
        execution_id: &ExecutionId,
        change_id: &str,
        author: &str,
        state: ChangeState,
    ) -> ChangeEntry {
        ChangeEntry::new(
            execution_id.clone(),
            change_id,
            author,
            state,
            self.clock.now_ms(),
        )
        .with_service_identifier(self.config.service_identifier.clone())
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The change log.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn EntryLedger> {
        &self.ledger
    }

    /// The lock manager.
    #[must_use]
    pub fn lock_manager(&self) -> &LockManager {
        &self.lock
    }

    /// Dependencies handed to change units.
    #[must_use]
    pub fn dependencies(&self) -> &Arc<DependencyRegistry> {
        &self.dependencies
    }

    /// The transaction coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Report of the most recent run, including failed ones.
    #[must_use]
    pub fn last_report(&self) -> Option<&MigrationReport> {
        self.last_report.as_ref()
    }
}

impl std::fmt::Debug for MigrationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRunner")
            .field("units", &self.change_ids())
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}
