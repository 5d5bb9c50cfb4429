//! Configuration module for ObjSync.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation, and defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for ObjSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Sync engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of concurrently executing sync operations.
    pub max_concurrent: u32,
}

/// Remote endpoint settings for the transport adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote resource store (e.g. `https://api.example.com/v1`).
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

/// Bounds for the concurrency ceiling; requests outside this range are
/// rejected by `validate()` rather than silently clamped.
const MAX_CONCURRENT_RANGE: std::ops::RangeInclusive<u32> = 1..=64;

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_concurrent: 6 }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !MAX_CONCURRENT_RANGE.contains(&self.engine.max_concurrent) {
            return Err(format!(
                "engine.max_concurrent must be between {} and {}, got {}",
                MAX_CONCURRENT_RANGE.start(),
                MAX_CONCURRENT_RANGE.end(),
                self.engine.max_concurrent
            ));
        }
        if self.remote.timeout_secs == 0 {
            return Err("remote.timeout_secs must be positive".to_string());
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(format!("logging.level '{other}' is not a valid level")),
        }
        Ok(())
    }
}
