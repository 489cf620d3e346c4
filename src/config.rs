//! Global application configuration.
//!
//! Stored in `<corkboard home>/config.yaml`. Everything has a default, so a
//! missing file is equivalent to an empty one. The values here tune the live
//! store; per-project settings live in the project descriptors instead.

use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CorkboardError, Result};
use crate::paths::global_config_path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Derived-data cache TTL in seconds (default: 3600)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Maximum number of derived-data cache entries (default: 4096)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Watcher debounce window in milliseconds (default: 200)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Broadcaster heartbeat interval in seconds (default: 30)
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_capacity() -> usize {
    4096
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_heartbeat_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
            debounce_ms: default_debounce_ms(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl Config {
    /// Load configuration from file, or return defaults if not found.
    pub fn load() -> Result<Self> {
        let path = global_config_path();
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            CorkboardError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config at {}: {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_yaml_ng::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file, creating the home directory if needed.
    pub fn save(&self) -> Result<()> {
        let path = global_config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CorkboardError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create directory for config at {}: {}",
                        parent.display(),
                        e
                    ),
                ))
            })?;
        }
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(&path, content).map_err(|e| {
            CorkboardError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write config at {}: {}", path.display(), e),
            ))
        })?;
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}
