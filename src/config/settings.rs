//! Application settings

use super::{config_path, ConfigError};
use crate::core::handshake::{millis, HandshakeConfig};
use crate::core::manager::ManagerConfig;
use crate::core::protocol::FramingMode;
use crate::core::throttle::DEFAULT_DEBOUNCE;
use crate::core::transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Inbound line framing
    pub framing: FramingMode,
    /// Serial port selection
    pub serial: SerialConfig,
    /// Handshake parameters
    pub handshake: HandshakeConfig,
    /// Pump throttle settings
    pub throttle: ThrottleSettings,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from the default location; a missing file yields defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    /// Load config from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.baud_rate == 0 {
            return Err(invalid("serial.baud_rate", "must be greater than 0"));
        }
        if self.handshake.attempts == 0 {
            return Err(invalid("handshake.attempts", "must be at least 1"));
        }
        if self.handshake.timeout.is_zero() {
            return Err(invalid("handshake.timeout_ms", "must be greater than 0"));
        }
        if self.handshake.probe_token.trim().is_empty() {
            return Err(invalid("handshake.probe_token", "must not be empty"));
        }
        Ok(())
    }

    /// Settings handed to the connection manager
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            baud_rate: self.serial.baud_rate,
            handshake: self.handshake.clone(),
            framing: self.framing,
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Pump throttle settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    /// Quiet period before a throttle value is written
    #[serde(rename = "debounce_ms", with = "millis")]
    pub debounce: Duration,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (e.g. `info`, `valvelink_core=debug`)
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Write a daily rolling log file into this directory
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}
