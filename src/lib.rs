//! # Valvelink Core Library
//!
//! Serial transport for a three-valve rig driven by a microcontroller:
//! - Opens a device through an injected capability (native serial or simulator)
//! - Verifies the link with a `conn` probe/echo handshake
//! - Frames inbound text into lines and dispatches them to an observer
//! - Writes newline-terminated commands
//! - Notifies listeners of connection status transitions
//!
//! ## Example
//!
//! ```rust,no_run
//! use valvelink_core::{Command, ManagerConfig, SerialConfig, SerialDeviceProvider, SerialManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = SerialDeviceProvider::new(SerialConfig::auto());
//!     let manager = SerialManager::new(provider, ManagerConfig::default());
//!
//!     manager.on_receive(|line| println!("<< {line}"));
//!     manager.on_connection_change(|up| println!("connected: {up}"));
//!
//!     manager.connect().await?;
//!     manager.send_command(&Command::set_valve(0, 45)?).await?;
//!     manager.disconnect().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::error::{ConnectError, SendError};
pub use crate::core::handshake::HandshakeConfig;
pub use crate::core::manager::{ManagerConfig, SerialManager};
pub use crate::core::protocol::{Command, CommandError, FramingMode, ValveTelemetry};
pub use crate::core::simulator::{ProbeReply, SimulatedRig, SimulatorConfig};
pub use crate::core::throttle::ThrottleSender;
pub use crate::core::transport::{
    list_ports, DeviceProvider, PortSummary, SerialConfig, SerialDevice, SerialDeviceProvider,
    TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
