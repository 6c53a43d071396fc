//! # Engine Configuration
//!
//! Tunables for the persistence engine, loadable from TOML.
//!
//! ```toml
//! write_concurrency = 32
//! max_column_file_bytes = 268435456
//! mmap_topology = true
//!
//! [fault_plan]
//! mode = "never"
//! ```

use crate::fault::FaultPlan;
use crate::primitives::{DEFAULT_MAX_COLUMN_FILE_BYTES, DEFAULT_WRITE_CONCURRENCY};
use crate::RdgError;
use serde::Deserialize;
use std::path::Path;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RdgConfig {
    /// Maximum number of blob writes in flight per `WriteGroup`.
    pub write_concurrency: usize,
    /// Largest column file accepted when loading.
    pub max_column_file_bytes: usize,
    /// Bind topology files by memory-mapping them (local storage only).
    pub mmap_topology: bool,
    /// Fault plan armed when the context is built.
    pub fault_plan: FaultPlan,
}

impl Default for RdgConfig {
    fn default() -> Self {
        Self {
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
            max_column_file_bytes: DEFAULT_MAX_COLUMN_FILE_BYTES,
            mmap_topology: true,
            fault_plan: FaultPlan::Never,
        }
    }
}

impl RdgConfig {
    /// Parse a configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, RdgError> {
        let config: Self = toml::from_str(s)
            .map_err(|e| RdgError::InvalidArgument(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RdgError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RdgError::IoError(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), RdgError> {
        if self.write_concurrency == 0 {
            return Err(RdgError::InvalidArgument(
                "write_concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_column_file_bytes == 0 {
            return Err(RdgError::InvalidArgument(
                "max_column_file_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
