//! Native serial port device

use super::{DeviceChannels, DeviceProvider, SerialDevice, TransportError, DEFAULT_BAUD_RATE};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serialport::SerialPortType;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tracing::{debug, info};

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0). `None` picks the first USB port.
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
}

impl SerialConfig {
    /// Create a configuration for a named port
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: Some(port.to_string()),
            baud_rate,
        }
    }

    /// Create a configuration that selects the first USB serial port
    pub fn auto() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::auto()
    }
}

/// Summary of an available port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortSummary {
    /// Port name
    pub name: String,
    /// Port type description
    pub kind: String,
    /// Whether this is a USB serial adapter
    pub usb: bool,
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<PortSummary>, TransportError> {
    let ports = serialport::available_ports()
        .map_err(|e| TransportError::ConnectionFailed(format!("Failed to list ports: {e}")))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (kind, usb) = match &p.port_type {
                SerialPortType::UsbPort(usb) => {
                    let product = usb.product.as_deref().unwrap_or("USB");
                    (format!("{product} ({:04X}:{:04X})", usb.vid, usb.pid), true)
                }
                SerialPortType::PciPort => ("PCI".to_string(), false),
                SerialPortType::BluetoothPort => ("Bluetooth".to_string(), false),
                SerialPortType::Unknown => ("Native".to_string(), false),
            };
            PortSummary {
                name: p.port_name,
                kind,
                usb,
            }
        })
        .collect())
}

/// Hands out the configured port, or the first USB port when none is set
#[derive(Debug, Clone, Default)]
pub struct SerialDeviceProvider {
    config: SerialConfig,
}

impl SerialDeviceProvider {
    /// Create a new provider
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    fn select_port(&self) -> Result<String, TransportError> {
        if let Some(port) = &self.config.port {
            return Ok(port.clone());
        }
        list_ports()?
            .into_iter()
            .find(|p| p.usb)
            .map(|p| p.name)
            .ok_or(TransportError::NoDeviceSelected)
    }
}

#[async_trait]
impl DeviceProvider for SerialDeviceProvider {
    async fn request_device(&self) -> Result<Box<dyn SerialDevice>, TransportError> {
        let port = self.select_port()?;
        debug!(%port, "Selected serial device");
        Ok(Box::new(SerialPortDevice::new(&port)))
    }
}

/// A serial port that can be opened as a pair of byte channels
#[derive(Debug)]
pub struct SerialPortDevice {
    port: String,
    is_open: bool,
}

impl SerialPortDevice {
    /// Create a device for a named port
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            is_open: false,
        }
    }

    fn map_open_error(&self, e: tokio_serial::Error) -> TransportError {
        match e.kind() {
            tokio_serial::ErrorKind::NoDevice => TransportError::PortNotFound(self.port.clone()),
            tokio_serial::ErrorKind::Io(io_kind) => match io_kind {
                std::io::ErrorKind::NotFound => TransportError::PortNotFound(self.port.clone()),
                std::io::ErrorKind::PermissionDenied => {
                    TransportError::PermissionDenied(self.port.clone())
                }
                std::io::ErrorKind::AddrInUse | std::io::ErrorKind::WouldBlock => {
                    TransportError::PortInUse(self.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            },
            _ => TransportError::ConnectionFailed(e.to_string()),
        }
    }
}

#[async_trait]
impl SerialDevice for SerialPortDevice {
    async fn open(&mut self, baud_rate: u32) -> Result<DeviceChannels, TransportError> {
        if self.is_open {
            return Err(TransportError::AlreadyOpen);
        }

        let stream = tokio_serial::new(&self.port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| self.map_open_error(e))?;

        let (readable, writable) = tokio::io::split(stream);
        self.is_open = true;
        info!(port = %self.port, baud_rate, "Serial port opened");

        Ok(DeviceChannels {
            readable: Box::new(readable),
            writable: Box::new(writable),
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::NotOpen);
        }
        // The stream is released once both split halves are dropped.
        self.is_open = false;
        info!(port = %self.port, "Serial port closed");
        Ok(())
    }

    fn info(&self) -> String {
        self.port.clone()
    }
}
