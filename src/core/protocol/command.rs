//! Wire commands for the valve rig firmware
//!
//! Host to device:
//! - `conn` handshake probe
//! - `V<index>:<angle>` set valve angle
//! - `CALIBRATE:<index>:<angle>` live calibration
//! - `p:<value>` pump throttle in percent
//!
//! Device to host telemetry is `V<index>:<angle>` with an optional degree sign.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Literal handshake probe token
pub const PROBE_TOKEN: &str = "conn";

/// Number of valves on the rig
pub const VALVE_COUNT: u8 = 3;

/// Lowest accepted servo angle in degrees
pub const MIN_ANGLE: i16 = -90;

/// Highest accepted servo angle in degrees
pub const MAX_ANGLE: i16 = 90;

/// Highest pump throttle in percent
pub const MAX_THROTTLE: u8 = 100;

/// Command validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Valve index out of range
    #[error("Invalid valve index {0} (rig has {n} valves)", n = VALVE_COUNT)]
    InvalidValve(u8),

    /// Angle out of range
    #[error("Angle {0}° outside {min}..={max}", min = MIN_ANGLE, max = MAX_ANGLE)]
    AngleOutOfRange(i16),

    /// Throttle out of range
    #[error("Throttle {0}% above {max}%", max = MAX_THROTTLE)]
    ThrottleOutOfRange(u8),

    /// Unparseable command text
    #[error("Invalid command: {0}")]
    InvalidFormat(String),
}

/// A host-to-device command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Handshake probe
    Probe,
    /// Drive a valve to an angle
    SetValve {
        /// 0-based valve index
        valve: u8,
        /// Target angle in degrees
        angle: i16,
    },
    /// Live calibration of a valve motor
    Calibrate {
        /// 0-based valve index
        valve: u8,
        /// Calibration angle in degrees
        angle: i16,
    },
    /// Pump throttle in percent
    PumpThrottle(u8),
}

impl Command {
    /// Build a validated set-valve command
    pub fn set_valve(valve: u8, angle: i16) -> Result<Self, CommandError> {
        check_valve(valve)?;
        check_angle(angle)?;
        Ok(Self::SetValve { valve, angle })
    }

    /// Build a validated calibration command
    pub fn calibrate(valve: u8, angle: i16) -> Result<Self, CommandError> {
        check_valve(valve)?;
        check_angle(angle)?;
        Ok(Self::Calibrate { valve, angle })
    }

    /// Build a validated pump throttle command
    pub fn pump_throttle(percent: u8) -> Result<Self, CommandError> {
        if percent > MAX_THROTTLE {
            return Err(CommandError::ThrottleOutOfRange(percent));
        }
        Ok(Self::PumpThrottle(percent))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probe => f.write_str(PROBE_TOKEN),
            Self::SetValve { valve, angle } => write!(f, "V{valve}:{angle}"),
            Self::Calibrate { valve, angle } => write!(f, "CALIBRATE:{valve}:{angle}"),
            Self::PumpThrottle(percent) => write!(f, "p:{percent}"),
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || CommandError::InvalidFormat(s.to_string());

        if s == PROBE_TOKEN {
            return Ok(Self::Probe);
        }
        if let Some(rest) = s.strip_prefix("CALIBRATE:") {
            let (valve, angle) = rest.split_once(':').ok_or_else(invalid)?;
            return Self::calibrate(
                valve.parse().map_err(|_| invalid())?,
                angle.parse().map_err(|_| invalid())?,
            );
        }
        if let Some(rest) = s.strip_prefix("p:") {
            return Self::pump_throttle(rest.parse().map_err(|_| invalid())?);
        }
        if let Some(rest) = s.strip_prefix('V') {
            let (valve, angle) = rest.split_once(':').ok_or_else(invalid)?;
            return Self::set_valve(
                valve.parse().map_err(|_| invalid())?,
                angle.parse().map_err(|_| invalid())?,
            );
        }
        Err(invalid())
    }
}

fn check_valve(valve: u8) -> Result<(), CommandError> {
    if valve >= VALVE_COUNT {
        return Err(CommandError::InvalidValve(valve));
    }
    Ok(())
}

fn check_angle(angle: i16) -> Result<(), CommandError> {
    if !(MIN_ANGLE..=MAX_ANGLE).contains(&angle) {
        return Err(CommandError::AngleOutOfRange(angle));
    }
    Ok(())
}

/// Valve angle reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValveTelemetry {
    /// 0-based valve index
    pub valve: u8,
    /// Reported angle in degrees
    pub angle: i16,
}

impl ValveTelemetry {
    /// Parse a received line such as `V1:45°` or `V1: 0°`.
    ///
    /// Returns `None` for lines that are not valve telemetry.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix('V')?;
        let (valve, angle) = rest.split_once(':')?;
        let angle = angle.trim().trim_end_matches('°').trim_end();

        Some(Self {
            valve: valve.trim().parse().ok()?,
            angle: angle.parse().ok()?,
        })
    }
}

impl fmt::Display for ValveTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}: {}°", self.valve, self.angle)
    }
}
