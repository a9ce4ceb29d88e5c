//! Configuration
//!
//! Tunables for throttling, cache defaults, snapshots, the worker bridge and
//! logging. Every field has a serde default, so a partial JSON document or an
//! empty environment yields a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::observability::{Event, Logger, Severity};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "SYME_";

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid configuration document: {0}")]
    Parse(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => "SYME_CONFIG_PARSE",
            ConfigError::InvalidValue { .. } => "SYME_CONFIG_INVALID_VALUE",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Crate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymeConfig {
    /// Change batching window in milliseconds (default: 10)
    #[serde(default = "default_throttle_window_ms")]
    pub throttle_window_ms: u64,

    /// Cache expiration when none is given (default: 500)
    #[serde(default = "default_expiration_ms")]
    pub default_expiration_ms: u64,

    /// Global the embeddable snapshot assigns to
    /// (default: "window.StorageController")
    #[serde(default = "default_snapshot_global")]
    pub snapshot_global: String,

    /// Logical namespace of the memory channel (default: "ServerState")
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// How long a bridge query waits for its answer (default: 1000)
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Minimum log severity (default: "WARN")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_throttle_window_ms() -> u64 {
    10
}

fn default_expiration_ms() -> u64 {
    500
}

fn default_snapshot_global() -> String {
    "window.StorageController".to_string()
}

fn default_namespace() -> String {
    "ServerState".to_string()
}

fn default_query_timeout_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "WARN".to_string()
}

impl Default for SymeConfig {
    fn default() -> Self {
        Self {
            throttle_window_ms: default_throttle_window_ms(),
            default_expiration_ms: default_expiration_ms(),
            snapshot_global: default_snapshot_global(),
            namespace: default_namespace(),
            query_timeout_ms: default_query_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl SymeConfig {
    /// Load from a JSON document
    pub fn from_json(raw: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.log_severity()?;
        Ok(config)
    }

    /// Defaults overlaid with `SYME_*` environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Defaults overlaid with `SYME_*` pairs from `vars`
    pub fn from_vars<I, K, V>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();

        for (name, value) in vars {
            let name = name.as_ref();
            let Some(field) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value: String = value.into();

            match field {
                "THROTTLE_WINDOW_MS" => config.throttle_window_ms = parse_millis(name, &value)?,
                "DEFAULT_EXPIRATION_MS" => {
                    config.default_expiration_ms = parse_millis(name, &value)?
                }
                "QUERY_TIMEOUT_MS" => config.query_timeout_ms = parse_millis(name, &value)?,
                "SNAPSHOT_GLOBAL" => config.snapshot_global = value,
                "NAMESPACE" => config.namespace = value,
                "LOG_LEVEL" => config.log_level = value,
                _ => {}
            }
        }

        config.log_severity()?;
        Ok(config)
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle_window_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn log_severity(&self) -> ConfigResult<Severity> {
        self.log_level
            .to_ascii_uppercase()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                name: "log_level".to_string(),
                value: self.log_level.clone(),
            })
    }

    /// Set the process-wide log level from this configuration
    pub fn apply_logging(&self) -> ConfigResult<()> {
        Logger::set_level(self.log_severity()?);
        Logger::info(
            Event::ConfigLoaded,
            &[("namespace", &self.namespace), ("log_level", &self.log_level)],
        );
        Ok(())
    }
}

fn parse_millis(name: &str, value: &str) -> ConfigResult<u64> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}
