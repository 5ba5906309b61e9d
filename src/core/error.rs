//! Errors raised by the connection manager
//!
//! - `ConnectError` is returned by `connect()`. The manager has already rolled
//!   back every partially acquired resource when it is returned.
//! - `SendError` is returned by `send()`.
//!
//! `disconnect()` never fails; teardown problems are logged instead.

use crate::core::transport::TransportError;
use thiserror::Error;

/// Failure to establish a verified connection
#[derive(Error, Debug)]
pub enum ConnectError {
    /// No device selected, permission denied, or device busy
    #[error("Device open failed: {0}")]
    DeviceOpenFailed(#[source] TransportError),

    /// The probe was never acknowledged
    #[error("Handshake failed after {attempts} probe(s)")]
    HandshakeFailed {
        /// Probes sent before giving up
        attempts: u32,
    },

    /// Writing a probe failed
    #[error("Handshake probe write failed: {0}")]
    ProbeWrite(#[source] std::io::Error),

    /// The device went away right after acknowledging the probe
    #[error("Link lost during connect")]
    LinkLost,

    /// A connection is already open or being opened
    #[error("Already connected")]
    AlreadyConnected,
}

/// Failure to write a line
#[derive(Error, Debug)]
pub enum SendError {
    /// No writer installed
    #[error("Serial port is not connected")]
    NotConnected,

    /// The outbound channel failed
    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
}
