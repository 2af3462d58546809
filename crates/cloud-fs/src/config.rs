//! Mount configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration of a cloud filesystem mount.
///
/// Every field has a default, so a configuration file only needs the keys
/// it wants to change. The secret is never part of this structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Identity used to authenticate against the provider.
    pub identity: String,
    /// Where the filesystem is mounted.
    pub mount_point: PathBuf,
    /// Base URL of the provider API.
    pub base_url: String,
    /// Upper bound on hydrated files kept after a sweep (0 disables it).
    pub max_cached_files: usize,
    /// Seconds between two eviction sweeps.
    pub sweep_interval_secs: u64,
    /// Idle seconds after which hydrated content is reclaimed.
    pub stale_after_secs: u64,
    /// Deadline for each provider request, in seconds.
    pub request_timeout_secs: u64,
    /// Rebuild the remote tree after every sweep.
    pub refresh_on_sweep: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            identity: String::new(),
            mount_point: PathBuf::from("/mnt/cloudfs"),
            base_url: "http://127.0.0.1:8080/api".to_string(),
            max_cached_files: 5,
            sweep_interval_secs: 120,
            stale_after_secs: 20 * 60,
            request_timeout_secs: 30,
            refresh_on_sweep: true,
        }
    }
}

impl MountConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Serialize the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject values the sweeper cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
