//! Core module containing the serial transport for the valve rig
//!
//! This module provides:
//! - Device capability seam and native serial implementation
//! - Text codec over the raw byte channels
//! - Line framing and typed rig commands
//! - Read pump, handshake verification and connection lifecycle
//! - Event dispatch to the line observer and connection listeners
//! - Debounced pump throttle
//! - Virtual rig simulation

pub mod codec;
pub mod error;
pub mod events;
pub mod handshake;
pub mod manager;
pub mod protocol;
pub mod pump;
pub mod simulator;
pub mod throttle;
pub mod transport;

mod writer;
