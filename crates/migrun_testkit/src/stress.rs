//! Contention tests for migrun.
//!
//! These helpers start several runners against one store at once and report
//! how the lock arbitrated between them.

use migrun_core::{ChangeUnit, CoreError, MigrationRunner, RunnerConfig};
use migrun_store::DocumentStore;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a contention run.
#[derive(Debug, Clone)]
pub struct ContentionResult {
    /// Runners whose run completed.
    pub completed: usize,
    /// Runners that gave up on the lock.
    pub lock_timeouts: usize,
    /// Runners that failed for any other reason.
    pub failed: usize,
    /// Units applied, summed over all runners.
    pub applied_units: usize,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl ContentionResult {
    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Completed: {}", self.completed);
        println!("Lock timeouts: {}", self.lock_timeouts);
        println!("Failed: {}", self.failed);
        println!("Applied units: {}", self.applied_units);
        println!("Duration: {:?}", self.duration);
    }
}

/// Configuration for contention runs.
#[derive(Debug, Clone)]
pub struct ContentionConfig {
    /// Number of concurrent runners.
    pub runners: usize,
    /// Runner configuration shared by all runners.
    pub runner: RunnerConfig,
}

impl Default for ContentionConfig {
    fn default() -> Self {
        Self {
            runners: 4,
            runner: RunnerConfig::new()
                .lock_acquired_for(10_000)
                .lock_refresh_margin(1_000)
                .lock_try_frequency(5)
                .lock_quit_trying_after(5_000),
        }
    }
}

/// Runs `config.runners` runners on separate threads against `store`.
///
/// Every runner registers the units produced by `units` and runs them on
/// the system clock.
pub fn run_concurrent_runners<F>(
    store: Arc<dyn DocumentStore>,
    config: &ContentionConfig,
    units: F,
) -> ContentionResult
where
    F: Fn() -> Vec<Box<dyn ChangeUnit>> + Send + Sync + 'static,
{
    let units = Arc::new(units);
    let start = Instant::now();

    let handles: Vec<_> = (0..config.runners)
        .map(|_| {
            let store = Arc::clone(&store);
            let units = Arc::clone(&units);
            let runner_config = config.runner.clone();

            thread::spawn(move || {
                let mut runner = MigrationRunner::new(runner_config, store)?;
                for unit in (*units)() {
                    runner.register(unit)?;
                }
                runner.run()
            })
        })
        .collect();

    let mut result = ContentionResult {
        completed: 0,
        lock_timeouts: 0,
        failed: 0,
        applied_units: 0,
        duration: Duration::ZERO,
    };
    for handle in handles {
        match handle.join() {
            Ok(Ok(report)) => {
                result.completed += 1;
                result.applied_units += report.applied_count();
            }
            Ok(Err(CoreError::LockNotAcquired { .. })) => result.lock_timeouts += 1,
            _ => result.failed += 1,
        }
    }
    result.duration = start.elapsed();
    result
}
