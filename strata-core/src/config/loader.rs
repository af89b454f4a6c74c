//! # Configuration Loader
//!
//! Reads the JSON configuration file, validates it, and normalizes its
//! paths to absolute ones.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Config;
use crate::error::{Result, StrataError};

/// Loads the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Path to configuration file
    config_path: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }
}

impl ConfigLoader {
    /// Create a new config loader with the default path
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config loader with a specific config file path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    /// The default configuration file path
    fn default_config_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// Load and validate the configuration
    pub fn load(&self) -> Result<Config> {
        let raw = std::fs::read_to_string(&self.config_path).map_err(|e| {
            StrataError::Configuration(format!(
                "could not open configuration file {}: {e}",
                self.config_path.display()
            ))
        })?;

        let mut config: Config = serde_json::from_str(&raw)
            .map_err(|e| StrataError::Configuration(format!("invalid configuration: {e}")))?;

        if config.ram.max_size_mb == 0 {
            return Err(StrataError::configuration("ram.maxSizeMB must be at least 1"));
        }

        config.disk.db_file = absolutize(&config.disk.db_file)?;
        config.socket.socket_path = absolutize(&config.socket.socket_path)?;

        debug!(path = %self.config_path.display(), "configuration loaded");
        Ok(config)
    }
}

/// Resolve a path against the current working directory.
fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}
