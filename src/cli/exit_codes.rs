//! CLI Exit Codes
//!
//! Exit codes for scripting against the rig.

use crate::config::ConfigError;
use crate::core::error::{ConnectError, SendError};
use crate::core::protocol::CommandError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Handshake not acknowledged
    pub const HANDSHAKE_FAILED: u8 = 4;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Write to the device failed
    pub const WRITE_FAILED: u8 = 9;

    /// User cancelled
    pub const CANCELLED: u8 = 11;

    /// No device selected
    pub const DEVICE_NOT_FOUND: u8 = 12;

    /// Device busy
    pub const DEVICE_BUSY: u8 = 13;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;

    /// Command rejected by validation
    pub const VALIDATION_FAILED: u8 = 17;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message for stdout
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Interrupted by the user
    pub fn cancelled() -> Self {
        Self::Error(ExitCodes::CANCELLED, "Interrupted".to_string())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to `ExitCode`
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

fn transport_code(err: &TransportError) -> u8 {
    match err {
        TransportError::NoDeviceSelected => ExitCodes::DEVICE_NOT_FOUND,
        TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
        TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
        TransportError::PortInUse(_) | TransportError::AlreadyOpen => ExitCodes::DEVICE_BUSY,
        _ => ExitCodes::CONNECTION_FAILED,
    }
}

impl From<&ConnectError> for CliResult {
    fn from(err: &ConnectError) -> Self {
        let code = match err {
            ConnectError::DeviceOpenFailed(cause) => transport_code(cause),
            ConnectError::HandshakeFailed { .. } => ExitCodes::HANDSHAKE_FAILED,
            ConnectError::ProbeWrite(_) | ConnectError::LinkLost => ExitCodes::CONNECTION_FAILED,
            ConnectError::AlreadyConnected => ExitCodes::ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<&SendError> for CliResult {
    fn from(err: &SendError) -> Self {
        let code = match err {
            SendError::NotConnected => ExitCodes::CONNECTION_FAILED,
            SendError::Io(_) => ExitCodes::WRITE_FAILED,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<&CommandError> for CliResult {
    fn from(err: &CommandError) -> Self {
        Self::Error(ExitCodes::VALIDATION_FAILED, err.to_string())
    }
}

impl From<&ConfigError> for CliResult {
    fn from(err: &ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

impl From<&anyhow::Error> for CliResult {
    fn from(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<ConnectError>() {
            return e.into();
        }
        if let Some(e) = err.downcast_ref::<SendError>() {
            return e.into();
        }
        if let Some(e) = err.downcast_ref::<CommandError>() {
            return e.into();
        }
        if let Some(e) = err.downcast_ref::<ConfigError>() {
            return e.into();
        }
        if let Some(e) = err.downcast_ref::<TransportError>() {
            return Self::Error(transport_code(e), e.to_string());
        }
        Self::Error(ExitCodes::ERROR, format!("{err:#}"))
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        3 => "Connection failed",
        4 => "Handshake not acknowledged",
        7 => "Permission denied",
        8 => "Configuration error",
        9 => "Write failed",
        11 => "Operation cancelled",
        12 => "No device selected",
        13 => "Device busy",
        14 => "Port not found",
        17 => "Validation failed",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 3, 4, 7, 8, 9, 11, 12, 13, 14, 17] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
