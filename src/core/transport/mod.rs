//! Device access layer
//!
//! The host environment owns device selection. The connection manager only
//! sees a [`DeviceProvider`] that hands out a [`SerialDevice`], which opens
//! into two independent raw byte channels.

mod serial;

pub use serial::{list_ports, PortSummary, SerialConfig, SerialDeviceProvider, SerialPortDevice};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Fixed line speed of the rig firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Raw inbound byte channel
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Raw outbound byte channel
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// The host offered no device, or the user cancelled the chooser
    #[error("No device selected")]
    NoDeviceSelected,

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Port already in use
    #[error("Port already in use: {0}")]
    PortInUse(String),

    /// Device already open
    #[error("Device already open")]
    AlreadyOpen,

    /// Device not open
    #[error("Device not open")]
    NotOpen,

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// The two raw channels of an open device
pub struct DeviceChannels {
    /// Bytes arriving from the device
    pub readable: BoxedReader,
    /// Bytes going to the device
    pub writable: BoxedWriter,
}

impl fmt::Debug for DeviceChannels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceChannels").finish_non_exhaustive()
    }
}

/// A device handed out by the host, not yet open
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SerialDevice: Send + Sync {
    /// Open the device at the given baud rate
    async fn open(&mut self, baud_rate: u32) -> Result<DeviceChannels, TransportError>;

    /// Close the device. Both channels must already be dropped.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Human readable description for logs
    fn info(&self) -> String;
}

/// Host capability to pick a device
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Ask the host for a device
    async fn request_device(&self) -> Result<Box<dyn SerialDevice>, TransportError>;
}
