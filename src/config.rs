//! Configuration management for Eventalyzer.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{EventalyzerError, Result};
use crate::tracker::TrackerOptions;

/// Main configuration for the Eventalyzer watcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventalyzerConfig {
    /// Sliding window configuration
    #[serde(default)]
    pub window: WindowConfig,

    /// Threshold alerting configuration
    #[serde(default)]
    pub alerting: AlertingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sliding window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Bucket interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Window length in milliseconds
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Idle time before a key is forgotten, in milliseconds
    #[serde(default)]
    pub cleanup_ms: Option<u64>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            ttl_ms: default_ttl_ms(),
            cleanup_ms: None,
        }
    }
}

impl From<&WindowConfig> for TrackerOptions {
    fn from(config: &WindowConfig) -> Self {
        TrackerOptions {
            interval_ms: config.interval_ms,
            ttl_ms: config.ttl_ms,
            cleanup_ms: config.cleanup_ms,
        }
    }
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_ttl_ms() -> u64 {
    60_000
}

/// Threshold alerting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    /// Window total at which a key is reported
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    /// Event field holding the tracking key
    #[serde(default = "default_key_field")]
    pub key_field: String,

    /// How often thresholds are checked, in milliseconds
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            key_field: default_key_field(),
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

fn default_threshold() -> u64 {
    100
}

fn default_key_field() -> String {
    "key".to_string()
}

fn default_check_interval_ms() -> u64 {
    1000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EventalyzerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| EventalyzerError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Window options for a tracker registry.
    pub fn tracker_options(&self) -> TrackerOptions {
        TrackerOptions::from(&self.window)
    }
}
