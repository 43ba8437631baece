//! Configuration schema for bucket-cache
//!
//! Configuration is stored at `~/.config/bucket-cache/config.toml`

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Bucket and freshness settings
    pub bucket: BucketConfig,

    /// Google Cloud Storage settings
    pub gcs: GcsConfig,
}

impl Config {
    /// Check the settings the cache client cannot run without
    pub fn validate(&self) -> CacheResult<()> {
        if self.bucket.name.trim().is_empty() {
            return Err(CacheError::BucketNotConfigured);
        }
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format, unless `--log-format` says otherwise
    pub log_format: LogFormat,
}

/// Log output format
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// How a due freshness refresh runs relative to `load`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMode {
    /// Re-upload before `load` returns; a failed re-upload fails the load
    #[default]
    Blocking,

    /// Re-upload on a spawned task; failures are logged
    Background,
}

/// Bucket settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Bucket holding cache objects
    pub name: String,

    /// Re-upload entries older than this on read (0 = disabled)
    pub refresh_after_secs: u64,

    /// Whether refresh blocks the load
    pub refresh_mode: RefreshMode,
}

impl BucketConfig {
    /// Refresh interval, `None` when refresh is disabled
    pub fn refresh_after(&self) -> Option<Duration> {
        (self.refresh_after_secs > 0).then(|| Duration::from_secs(self.refresh_after_secs))
    }
}

/// Google Cloud Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsConfig {
    /// API endpoint (overridden by STORAGE_EMULATOR_HOST)
    pub endpoint: String,

    /// Service account to impersonate when minting tokens
    pub service_account: Option<String>,

    /// Skip credential resolution (for emulators and public buckets)
    pub anonymous: bool,

    /// Per-request timeout in seconds (0 = no timeout)
    pub timeout_secs: u64,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://storage.googleapis.com".to_string(),
            service_account: None,
            anonymous: false,
            timeout_secs: 120,
        }
    }
}
