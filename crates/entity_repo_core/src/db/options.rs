//! Context configuration.
//!
//! # Responsibility
//! - Describe where a context stores data and how its connection is tuned.
//! - Deserialize from host configuration (all fields optional).
//!
//! # Invariants
//! - Defaults match `DbContextOptions::default()` for missing fields.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Storage location of a context database.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// Private in-memory database, discarded with the connection.
    #[default]
    Memory,
    /// SQLite database file, created if missing.
    File { path: PathBuf },
}

/// Options used to open an `ObjectContext`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbContextOptions {
    pub data_source: DataSource,
    /// Enables `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
    /// SQLite busy handler timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Creates missing mapped tables when the context opens.
    pub ensure_created: bool,
}

impl Default for DbContextOptions {
    fn default() -> Self {
        Self {
            data_source: DataSource::Memory,
            foreign_keys: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            ensure_created: true,
        }
    }
}

impl DbContextOptions {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            data_source: DataSource::File { path: path.into() },
            ..Self::default()
        }
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_ensure_created(mut self, enabled: bool) -> Self {
        self.ensure_created = enabled;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Short label used in log events.
    pub(crate) fn mode(&self) -> &'static str {
        match self.data_source {
            DataSource::Memory => "memory",
            DataSource::File { .. } => "file",
        }
    }
}
