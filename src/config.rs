//! Configuration management for Weir.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, WeirError};

/// Main configuration for a limiter instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeirConfig {
    /// Quota policy applied by `incr`
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Shared store connection
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for WeirConfig {
    fn default() -> Self {
        Self {
            limiter: LimiterConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Quota policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum usage per window
    #[serde(default = "default_limit")]
    pub limit: i64,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_ms: default_window_ms(),
        }
    }
}

impl LimiterConfig {
    /// The window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

fn default_limit() -> i64 {
    100
}

fn default_window_ms() -> u64 {
    60_000
}

/// Store connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis URL (e.g. redis://localhost:6379)
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Number of multiplexed connections to hold open
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Namespace prefix prepended to every persisted key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            pool_size: default_pool_size(),
            key_prefix: default_key_prefix(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl StoreConfig {
    /// The connection timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_pool_size() -> usize {
    4
}

fn default_key_prefix() -> String {
    "weir".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl WeirConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| WeirError::Config(e.to_string()))
    }
}
