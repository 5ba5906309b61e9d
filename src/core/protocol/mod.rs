//! Rig protocol
//!
//! Provides the line framer for device output and the typed command set
//! understood by the valve rig firmware.

pub mod command;
pub mod framing;

pub use command::{
    Command, CommandError, ValveTelemetry, MAX_ANGLE, MAX_THROTTLE, MIN_ANGLE, PROBE_TOKEN,
    VALVE_COUNT,
};
pub use framing::{split_lines, FramingMode, LineFramer};
