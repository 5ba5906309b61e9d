//! Configuration module
//!
//! Handles application settings stored as TOML

mod settings;

pub use settings::{AppConfig, LoggingConfig, ThrottleSettings};

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Platform config directory could not be determined
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Reading or writing the file failed
    #[error("Config file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization failed
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending key
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "valvelink", "Valvelink")
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default configuration file path
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CONFIG_FILE))
}
