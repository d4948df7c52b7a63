//! Configuration for the handle manager

use crate::{Result, StorageError, io_error};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default bound on the handle table.
pub const DEFAULT_MAX_FILES: usize = 5000;

/// Default bound on simultaneously connected OS files.
pub const DEFAULT_MAX_UNITS: usize = 23;

/// Capacities and behaviour of a [`HandleManager`](crate::HandleManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Maximum number of open handles.
    pub max_files: usize,

    /// Maximum number of OS files connected at once. Handles beyond this
    /// share the pool and reconnect on demand.
    pub max_units: usize,

    /// Flush written files to stable storage when their last link closes.
    pub sync_on_close: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_units: DEFAULT_MAX_UNITS,
            sync_on_close: true,
        }
    }
}

impl ManagerConfig {
    /// Set the handle table bound.
    #[must_use]
    pub const fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    /// Set the unit pool bound.
    #[must_use]
    pub const fn with_max_units(mut self, max_units: usize) -> Self {
        self.max_units = max_units;
        self
    }

    /// Enable or disable syncing on close.
    #[must_use]
    pub const fn with_sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }

    /// Check that the capacities are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_files == 0 {
            return Err(StorageError::Config("max_files must be at least 1".to_string()));
        }
        if self.max_units == 0 {
            return Err(StorageError::Config("max_units must be at least 1".to_string()));
        }
        if self.max_units > self.max_files {
            return Err(StorageError::Config(format!(
                "max_units ({}) exceeds max_files ({})",
                self.max_units, self.max_files
            )));
        }
        Ok(())
    }

    /// Load and validate a JSON configuration file.
    ///
    /// Missing fields take their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(io_error(path))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| StorageError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }
}
