//! Runner configuration.

use crate::error::{CoreError, CoreResult};
use migrun_store::Capacity;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a migration runner.
///
/// Field names follow the camelCase keys accepted in JSON config files, so
/// `lockAcquiredForMillis` maps to [`RunnerConfig::lock_acquired_for_millis`].
/// Missing keys take their default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    /// How long an acquired lease stays valid without renewal.
    pub lock_acquired_for_millis: u64,

    /// How long to keep retrying a contended lock before giving up.
    pub lock_quit_trying_after_millis: u64,

    /// Delay between lock acquisition attempts.
    pub lock_try_frequency_millis: u64,

    /// Renew the lease when less than this much time is left on it.
    pub lock_refresh_margin_millis: u64,

    /// Key of the lease record.
    pub lock_name: String,

    /// Collection holding the lease record.
    pub lock_repository_name: String,

    /// Collection holding change entries.
    pub migration_repository_name: String,

    /// Whether missing collections (and their key indexes) may be created.
    pub index_creation: bool,

    /// Capacity hint for the change entry collection.
    pub capacity: Option<Capacity>,

    /// Whether change units run inside atomic batches.
    pub transaction_enabled: bool,

    /// Author recorded for change units that do not name one.
    pub default_author: String,

    /// Identifier of the service running migrations, stored on entries.
    pub service_identifier: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            lock_acquired_for_millis: 60_000,
            lock_quit_trying_after_millis: 180_000, // 3 minutes
            lock_try_frequency_millis: 1_000,
            lock_refresh_margin_millis: 10_000,
            lock_name: "migrun-lock".to_string(),
            lock_repository_name: "migrunLock".to_string(),
            migration_repository_name: "migrunChangeLog".to_string(),
            index_creation: true,
            capacity: Some(Capacity::new(50, 50)),
            transaction_enabled: true,
            default_author: "migrun".to_string(),
            service_identifier: None,
        }
    }
}

impl RunnerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON text.
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> CoreResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            CoreError::invalid_config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&data)
    }

    /// Sets the lease hold duration.
    #[must_use]
    pub const fn lock_acquired_for(mut self, millis: u64) -> Self {
        self.lock_acquired_for_millis = millis;
        self
    }

    /// Sets the give-up deadline for lock acquisition.
    #[must_use]
    pub const fn lock_quit_trying_after(mut self, millis: u64) -> Self {
        self.lock_quit_trying_after_millis = millis;
        self
    }

    /// Sets the lock polling interval.
    #[must_use]
    pub const fn lock_try_frequency(mut self, millis: u64) -> Self {
        self.lock_try_frequency_millis = millis;
        self
    }

    /// Sets the renewal margin.
    #[must_use]
    pub const fn lock_refresh_margin(mut self, millis: u64) -> Self {
        self.lock_refresh_margin_millis = millis;
        self
    }

    /// Sets the lock name.
    #[must_use]
    pub fn lock_name(mut self, name: impl Into<String>) -> Self {
        self.lock_name = name.into();
        self
    }

    /// Sets the lock collection name.
    #[must_use]
    pub fn lock_repository_name(mut self, name: impl Into<String>) -> Self {
        self.lock_repository_name = name.into();
        self
    }

    /// Sets the change entry collection name.
    #[must_use]
    pub fn migration_repository_name(mut self, name: impl Into<String>) -> Self {
        self.migration_repository_name = name.into();
        self
    }

    /// Sets whether missing collections may be created.
    #[must_use]
    pub const fn index_creation(mut self, value: bool) -> Self {
        self.index_creation = value;
        self
    }

    /// Sets the capacity hint.
    #[must_use]
    pub const fn capacity(mut self, capacity: Option<Capacity>) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets whether change units run inside atomic batches.
    #[must_use]
    pub const fn transaction_enabled(mut self, value: bool) -> Self {
        self.transaction_enabled = value;
        self
    }

    /// Sets the default author.
    #[must_use]
    pub fn default_author(mut self, author: impl Into<String>) -> Self {
        self.default_author = author.into();
        self
    }

    /// Sets the service identifier.
    #[must_use]
    pub fn service_identifier(mut self, id: impl Into<String>) -> Self {
        self.service_identifier = Some(id.into());
        self
    }

    /// Lease hold duration.
    #[must_use]
    pub const fn hold_duration(&self) -> Duration {
        Duration::from_millis(self.lock_acquired_for_millis)
    }

    /// Give-up deadline for lock acquisition.
    #[must_use]
    pub const fn give_up_after(&self) -> Duration {
        Duration::from_millis(self.lock_quit_trying_after_millis)
    }

    /// Lock polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_try_frequency_millis)
    }

    /// Renewal margin.
    #[must_use]
    pub const fn refresh_margin(&self) -> Duration {
        Duration::from_millis(self.lock_refresh_margin_millis)
    }

    /// Capacity hint for the lock collection.
    ///
    /// The lock collection sees one item, so it gets a minimal hint whenever
    /// the entry collection has one.
    #[must_use]
    pub fn lock_capacity(&self) -> Option<Capacity> {
        self.capacity.map(|_| Capacity::new(1, 1))
    }

    /// Checks the configuration for values the runner cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.lock_acquired_for_millis == 0 {
            return Err(CoreError::invalid_config(
                "lockAcquiredForMillis must be greater than zero",
            ));
        }
        if self.lock_try_frequency_millis == 0 {
            return Err(CoreError::invalid_config(
                "lockTryFrequencyMillis must be greater than zero",
            ));
        }
        if self.lock_refresh_margin_millis >= self.lock_acquired_for_millis {
            return Err(CoreError::invalid_config(
                "lockRefreshMarginMillis must be smaller than lockAcquiredForMillis",
            ));
        }
        for (field, value) in [
            ("lockName", &self.lock_name),
            ("lockRepositoryName", &self.lock_repository_name),
            ("migrationRepositoryName", &self.migration_repository_name),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::invalid_config(format!("{field} must not be empty")));
            }
        }
        if self.lock_repository_name == self.migration_repository_name {
            return Err(CoreError::invalid_config(
                "lock and migration repositories must be different collections",
            ));
        }
        Ok(())
    }
}
