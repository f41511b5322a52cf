//! Endpoint configuration
//!
//! System ids and both timer periods are runtime settings so hosts and tests
//! can pick their own values.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for one log endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    /// Directory that receives the log files
    pub logs_dir: PathBuf,
    /// Remote system whose stream is logged
    #[serde(default = "defaults::target_system_id")]
    pub target_system_id: u8,
    /// System id used when this endpoint sends requests
    #[serde(default = "defaults::system_id")]
    pub system_id: u8,
    /// Component id used when this endpoint sends requests
    #[serde(default)]
    pub component_id: u8,
    /// Period of the startup check
    #[serde(default = "defaults::startup_interval_ms")]
    pub startup_interval_ms: u64,
    /// Silence after which the log file is rotated
    #[serde(default = "defaults::alive_timeout_ms")]
    pub alive_timeout_ms: u64,
}

mod defaults {
    pub fn target_system_id() -> u8 {
        1
    }

    pub fn system_id() -> u8 {
        2
    }

    pub fn startup_interval_ms() -> u64 {
        1000
    }

    pub fn alive_timeout_ms() -> u64 {
        5000
    }
}

impl EndpointConfig {
    /// Default settings logging into `logs_dir`
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            target_system_id: defaults::target_system_id(),
            system_id: defaults::system_id(),
            component_id: 0,
            startup_interval_ms: defaults::startup_interval_ms(),
            alive_timeout_ms: defaults::alive_timeout_ms(),
        }
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EndpointConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the timers cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.startup_interval_ms == 0 {
            return Err(ConfigError::Invalid("startup_interval_ms must be non-zero".into()));
        }
        if self.alive_timeout_ms == 0 {
            return Err(ConfigError::Invalid("alive_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    /// Log a different remote system
    pub fn with_target_system_id(mut self, id: u8) -> Self {
        self.target_system_id = id;
        self
    }

    /// Override the startup check period
    pub fn with_startup_interval_ms(mut self, ms: u64) -> Self {
        self.startup_interval_ms = ms;
        self
    }

    /// Override the liveness timeout
    pub fn with_alive_timeout_ms(mut self, ms: u64) -> Self {
        self.alive_timeout_ms = ms;
        self
    }

    /// Startup check period
    pub fn startup_interval(&self) -> Duration {
        Duration::from_millis(self.startup_interval_ms)
    }

    /// Liveness timeout
    pub fn alive_timeout(&self) -> Duration {
        Duration::from_millis(self.alive_timeout_ms)
    }
}
