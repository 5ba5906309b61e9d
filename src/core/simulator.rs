//! Virtual rig simulator
//!
//! Stands in for the valve controller behind the [`DeviceProvider`] seam. The
//! simulated firmware answers the handshake probe according to a
//! [`ProbeReply`] policy, echoes valve commands as telemetry and records every
//! line it receives. Tests and the `--simulate` CLI mode drive it.

use crate::core::protocol::{Command, ValveTelemetry, PROBE_TOKEN, VALVE_COUNT};
use crate::core::transport::{DeviceChannels, DeviceProvider, SerialDevice, TransportError};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::debug;

const PIPE_CAPACITY: usize = 4096;

/// When the simulated firmware acknowledges the handshake probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeReply {
    /// Every probe is echoed
    #[default]
    Always,
    /// Probes are never echoed
    Never,
    /// Probes are echoed from the given 1-based probe number on
    FromAttempt(u32),
}

/// Reason the simulated device refuses to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    /// Access denied by the host
    PermissionDenied,
    /// Another process holds the port
    Busy,
}

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Name reported as device info
    pub name: String,
    /// Handshake behaviour
    pub probe_reply: ProbeReply,
    /// Lines printed right after the port opens
    pub boot_banner: Vec<String>,
    /// Echo valve and calibration commands as telemetry
    pub echo_telemetry: bool,
    /// Delay before each reply
    pub reply_delay: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            name: "sim://valve-rig".to_string(),
            probe_reply: ProbeReply::Always,
            boot_banner: Vec::new(),
            echo_telemetry: true,
            reply_delay: Duration::ZERO,
        }
    }
}

impl SimulatorConfig {
    /// Set probe reply policy
    #[must_use]
    pub fn probe_reply(mut self, reply: ProbeReply) -> Self {
        self.probe_reply = reply;
        self
    }

    /// Set boot banner
    #[must_use]
    pub fn boot_banner(mut self, lines: &[&str]) -> Self {
        self.boot_banner = lines.iter().map(|l| (*l).to_string()).collect();
        self
    }

    /// Enable or disable telemetry echo
    #[must_use]
    pub fn echo_telemetry(mut self, enable: bool) -> Self {
        self.echo_telemetry = enable;
        self
    }

    /// Set reply delay
    #[must_use]
    pub fn reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }
}

enum RigInput {
    Raw(String),
    Unplug,
}

#[derive(Default)]
struct RigState {
    received: Vec<String>,
    probes: u32,
    opens: u32,
    closes: u32,
    attached: bool,
    unavailable: bool,
    open_failure: Option<OpenFailure>,
    valves: [i16; VALVE_COUNT as usize],
    throttle: u8,
    input_tx: Option<mpsc::UnboundedSender<RigInput>>,
}

struct RigShared {
    config: SimulatorConfig,
    state: Mutex<RigState>,
}

/// Simulated valve rig; clones share the same device
#[derive(Clone)]
pub struct SimulatedRig {
    shared: Arc<RigShared>,
}

impl Default for SimulatedRig {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl SimulatedRig {
    /// Create a new simulated rig
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            shared: Arc::new(RigShared {
                config,
                state: Mutex::new(RigState::default()),
            }),
        }
    }

    /// Make the host chooser come back empty
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.state.lock().unavailable = unavailable;
    }

    /// Make the next opens fail
    pub fn set_open_failure(&self, failure: Option<OpenFailure>) {
        self.shared.state.lock().open_failure = failure;
    }

    /// Push raw text to the host as if the firmware printed it
    pub fn inject(&self, raw: &str) -> bool {
        self.input(RigInput::Raw(raw.to_string()))
    }

    /// Simulate the cable being pulled
    pub fn unplug(&self) -> bool {
        self.input(RigInput::Unplug)
    }

    fn input(&self, input: RigInput) -> bool {
        self.shared
            .state
            .lock()
            .input_tx
            .as_ref()
            .is_some_and(|tx| tx.send(input).is_ok())
    }

    /// Lines the firmware has received
    pub fn received_lines(&self) -> Vec<String> {
        self.shared.state.lock().received.clone()
    }

    /// Number of handshake probes received
    pub fn probe_count(&self) -> u32 {
        self.shared.state.lock().probes
    }

    /// Number of times the device was opened
    pub fn open_count(&self) -> u32 {
        self.shared.state.lock().opens
    }

    /// Number of times the device was closed
    pub fn close_count(&self) -> u32 {
        self.shared.state.lock().closes
    }

    /// Whether the firmware side of the link is still running
    pub fn is_attached(&self) -> bool {
        self.shared.state.lock().attached
    }

    /// Current valve angles
    pub fn valve_angles(&self) -> [i16; VALVE_COUNT as usize] {
        self.shared.state.lock().valves
    }

    /// Current pump throttle
    pub fn throttle(&self) -> u8 {
        self.shared.state.lock().throttle
    }
}

#[async_trait]
impl DeviceProvider for SimulatedRig {
    async fn request_device(&self) -> Result<Box<dyn SerialDevice>, TransportError> {
        if self.shared.state.lock().unavailable {
            return Err(TransportError::NoDeviceSelected);
        }
        Ok(Box::new(SimulatedDevice {
            rig: self.clone(),
            is_open: false,
        }))
    }
}

/// Device handle for a [`SimulatedRig`]
pub struct SimulatedDevice {
    rig: SimulatedRig,
    is_open: bool,
}

#[async_trait]
impl SerialDevice for SimulatedDevice {
    async fn open(&mut self, baud_rate: u32) -> Result<DeviceChannels, TransportError> {
        if self.is_open {
            return Err(TransportError::AlreadyOpen);
        }

        let name = self.rig.shared.config.name.clone();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        {
            let mut state = self.rig.shared.state.lock();
            match state.open_failure {
                Some(OpenFailure::PermissionDenied) => {
                    return Err(TransportError::PermissionDenied(name));
                }
                Some(OpenFailure::Busy) => return Err(TransportError::PortInUse(name)),
                None => {}
            }
            state.opens += 1;
            state.attached = true;
            state.input_tx = Some(input_tx);
        }

        let (host_end, device_end) = tokio::io::duplex(PIPE_CAPACITY);
        tokio::spawn(run_firmware(self.rig.shared.clone(), device_end, input_rx));

        self.is_open = true;
        debug!(device = %name, baud_rate, "Simulated device opened");

        let (readable, writable) = tokio::io::split(host_end);
        Ok(DeviceChannels {
            readable: Box::new(readable),
            writable: Box::new(writable),
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::NotOpen);
        }
        self.is_open = false;
        let mut state = self.rig.shared.state.lock();
        state.closes += 1;
        state.input_tx = None;
        Ok(())
    }

    fn info(&self) -> String {
        self.rig.shared.config.name.clone()
    }
}

async fn run_firmware(
    shared: Arc<RigShared>,
    device_end: DuplexStream,
    mut input_rx: mpsc::UnboundedReceiver<RigInput>,
) {
    let (reader, mut writer) = tokio::io::split(device_end);
    let mut lines = FramedRead::new(reader, LinesCodec::new());

    for line in &shared.config.boot_banner {
        if write_line(&mut writer, line).await.is_err() {
            break;
        }
    }

    loop {
        tokio::select! {
            line = lines.next() => {
                let Some(Ok(line)) = line else { break };
                let Some(reply) = handle_line(&shared, line.trim()) else { continue };
                if !shared.config.reply_delay.is_zero() {
                    tokio::time::sleep(shared.config.reply_delay).await;
                }
                if write_line(&mut writer, &reply).await.is_err() {
                    break;
                }
            }
            input = input_rx.recv() => match input {
                Some(RigInput::Raw(text)) => {
                    if writer.write_all(text.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Some(RigInput::Unplug) | None => break,
            }
        }
    }

    shared.state.lock().attached = false;
    debug!("Simulated firmware stopped");
}

async fn write_line(writer: &mut WriteHalf<DuplexStream>, line: &str) -> std::io::Result<()> {
    writer.write_all(format!("{line}\r\n").as_bytes()).await
}

fn handle_line(shared: &RigShared, line: &str) -> Option<String> {
    let mut state = shared.state.lock();
    state.received.push(line.to_string());

    match line.parse::<Command>() {
        Ok(Command::Probe) => {
            state.probes += 1;
            let reply = match shared.config.probe_reply {
                ProbeReply::Always => true,
                ProbeReply::Never => false,
                ProbeReply::FromAttempt(n) => state.probes >= n,
            };
            reply.then(|| PROBE_TOKEN.to_string())
        }
        Ok(Command::SetValve { valve, angle } | Command::Calibrate { valve, angle }) => {
            state.valves[usize::from(valve)] = angle;
            shared
                .config
                .echo_telemetry
                .then(|| ValveTelemetry { valve, angle }.to_string())
        }
        Ok(Command::PumpThrottle(percent)) => {
            state.throttle = percent;
            None
        }
        Err(_) => None,
    }
}
