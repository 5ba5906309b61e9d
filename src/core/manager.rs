//! Connection lifecycle manager
//!
//! [`SerialManager`] owns at most one open device at a time. `connect()`
//! requests a device from the injected [`DeviceProvider`], opens it, wraps
//! both raw channels in text adapters, starts the read pump and runs the
//! handshake. `disconnect()` unwinds all of it in a fixed order: cancel the
//! pump and wait for it, close the writer, close the device.
//!
//! `connected` becomes true only after a successful handshake and drops back
//! to false on `disconnect()` or when the pump sees the link go away.

use crate::core::codec::{text_reader, text_writer};
use crate::core::error::{ConnectError, SendError};
use crate::core::events::EventDispatcher;
use crate::core::handshake::{HandshakeConfig, HandshakeVerifier, VerificationBuffer};
use crate::core::protocol::{Command, FramingMode, LineFramer};
use crate::core::pump::{PumpExit, ReadPump};
use crate::core::transport::{DeviceProvider, SerialDevice, DEFAULT_BAUD_RATE};
use crate::core::writer::LineWriter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Connection manager settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Line speed used to open the device
    pub baud_rate: u32,
    /// Handshake parameters
    pub handshake: HandshakeConfig,
    /// Inbound line framing
    pub framing: FramingMode,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            handshake: HandshakeConfig::default(),
            framing: FramingMode::default(),
        }
    }
}

/// Connection status shared with the read pump
struct LinkStatus {
    connected: AtomicBool,
    alive: AtomicBool,
    // Serializes status changes so notifications keep their order.
    transition: Mutex<()>,
    dispatcher: Arc<EventDispatcher>,
}

impl LinkStatus {
    fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            connected: AtomicBool::new(false),
            alive: AtomicBool::new(false),
            transition: Mutex::new(()),
            dispatcher,
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn arm(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Mark the link up; fails if the pump already saw it die
    fn set_up(&self) -> bool {
        let _guard = self.transition.lock();
        if !self.alive.load(Ordering::SeqCst) {
            return false;
        }
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.dispatcher.dispatch_connection(true);
        }
        true
    }

    fn set_down(&self) {
        let _guard = self.transition.lock();
        self.alive.store(false, Ordering::SeqCst);
        if self.connected.swap(false, Ordering::SeqCst) {
            self.dispatcher.dispatch_connection(false);
        }
    }
}

/// Clears the in-flight connect flag when `connect()` returns
struct ConnectAttempt<'a>(&'a AtomicBool);

impl<'a> ConnectAttempt<'a> {
    fn begin(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Resources of one open connection
struct Session {
    device: Box<dyn SerialDevice>,
    cancel: CancellationToken,
    pump: JoinHandle<PumpExit>,
}

/// Serial transport manager for the valve rig
pub struct SerialManager {
    provider: Arc<dyn DeviceProvider>,
    config: ManagerConfig,
    verifier: HandshakeVerifier,
    dispatcher: Arc<EventDispatcher>,
    buffer: Arc<VerificationBuffer>,
    writer: LineWriter,
    status: Arc<LinkStatus>,
    session: tokio::sync::Mutex<Option<Session>>,
    connecting: AtomicBool,
    device_info: Mutex<Option<String>>,
}

impl SerialManager {
    /// Create a manager around a device provider
    pub fn new<P>(provider: P, config: ManagerConfig) -> Self
    where
        P: DeviceProvider + 'static,
    {
        Self::with_provider(Arc::new(provider), config)
    }

    /// Create a manager around a shared device provider
    pub fn with_provider(provider: Arc<dyn DeviceProvider>, config: ManagerConfig) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new());
        Self {
            provider,
            verifier: HandshakeVerifier::new(config.handshake.clone()),
            config,
            status: Arc::new(LinkStatus::new(dispatcher.clone())),
            dispatcher,
            buffer: Arc::new(VerificationBuffer::new()),
            writer: LineWriter::new(),
            session: tokio::sync::Mutex::new(None),
            connecting: AtomicBool::new(false),
            device_info: Mutex::new(None),
        }
    }

    /// Manager settings
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Open the device and verify the link.
    ///
    /// Fails with [`ConnectError::AlreadyConnected`] while a verified
    /// connection is open or another `connect()` is still running. A
    /// `disconnect()` in progress is waited for.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let _attempt =
            ConnectAttempt::begin(&self.connecting).ok_or(ConnectError::AlreadyConnected)?;
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            if self.status.is_connected() {
                return Err(ConnectError::AlreadyConnected);
            }
            // Link died under us; release what is left before starting over.
            if let Some(stale) = slot.take() {
                debug!("Releasing stale session before reconnect");
                self.teardown(stale).await;
            }
        }

        let mut device = self
            .provider
            .request_device()
            .await
            .map_err(ConnectError::DeviceOpenFailed)?;
        let device_name = device.info();
        let channels = device
            .open(self.config.baud_rate)
            .await
            .map_err(ConnectError::DeviceOpenFailed)?;
        info!(device = %device_name, baud_rate = self.config.baud_rate, "Device opened");

        self.status.arm();
        let cancel = CancellationToken::new();
        let pump = ReadPump {
            reader: text_reader(channels.readable),
            framer: LineFramer::new(self.config.framing),
            buffer: self.buffer.clone(),
            dispatcher: self.dispatcher.clone(),
            cancel: cancel.clone(),
        };
        let status = self.status.clone();
        let pump = tokio::spawn(pump.run(move || status.set_down()));
        self.writer.install(text_writer(channels.writable)).await;

        let session = Session {
            device,
            cancel,
            pump,
        };

        let verified = match self.verifier.verify(&self.writer, &self.buffer).await {
            Ok(attempts) if self.status.set_up() => Ok(attempts),
            Ok(_) => Err(ConnectError::LinkLost),
            Err(e) => Err(e),
        };

        match verified {
            Ok(attempts) => {
                *slot = Some(session);
                *self.device_info.lock() = Some(device_name.clone());
                info!(device = %device_name, attempts, "Connected");
                Ok(())
            }
            Err(e) => {
                warn!(device = %device_name, error = %e, "Connect failed, rolling back");
                self.teardown(session).await;
                Err(e)
            }
        }
    }

    /// Tear the connection down. Never fails and is a no-op when idle.
    pub async fn disconnect(&self) {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.take() {
            self.teardown(session).await;
            info!("Disconnected");
        }
        self.status.set_down();
    }

    async fn teardown(&self, session: Session) {
        let Session {
            mut device,
            cancel,
            pump,
        } = session;

        // The pending read must be cancelled before the handle goes away.
        cancel.cancel();
        match pump.await {
            Ok(exit) => debug!(?exit, "Read pump finished"),
            Err(e) => warn!(error = %e, "Read pump task failed"),
        }

        if let Err(e) = self.writer.close().await {
            warn!(error = %e, "Error closing outbound channel");
        }

        if let Err(e) = device.close().await {
            warn!(error = %e, "Error closing device");
        }

        self.buffer.end();
        *self.device_info.lock() = None;
    }

    /// Write one line; LF is appended
    pub async fn send(&self, text: &str) -> Result<(), SendError> {
        // The writer may outlive a link the pump already saw close.
        if !self.status.is_connected() {
            return Err(SendError::NotConnected);
        }
        self.writer.send_line(text).await
    }

    /// Write a typed rig command
    pub async fn send_command(&self, command: &Command) -> Result<(), SendError> {
        self.send(&command.to_string()).await
    }

    /// Whether a verified connection is open
    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// Description of the open device
    pub fn device_info(&self) -> Option<String> {
        self.device_info.lock().clone()
    }

    /// Install the line observer, replacing the previous one
    pub fn on_receive<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.dispatcher.on_receive(callback);
    }

    /// Add a connection status listener
    pub fn on_connection_change<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.dispatcher.on_connection_change(callback);
    }
}

impl Drop for SerialManager {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{
        DeviceChannels, MockDeviceProvider, MockSerialDevice, TransportError,
    };
    use std::time::Duration;

    fn provider_with(device: MockSerialDevice) -> MockDeviceProvider {
        let mut provider = MockDeviceProvider::new();
        provider
            .expect_request_device()
            .return_once(move || Ok(Box::new(device)));
        provider
    }

    #[tokio::test]
    async fn test_no_device_selected() {
        let mut provider = MockDeviceProvider::new();
        provider
            .expect_request_device()
            .returning(|| Err(TransportError::NoDeviceSelected));
        let manager = SerialManager::new(provider, ManagerConfig::default());

        let result = manager.connect().await;
        assert!(matches!(
            result,
            Err(ConnectError::DeviceOpenFailed(TransportError::NoDeviceSelected))
        ));
        assert!(!manager.is_connected());
        assert!(matches!(manager.send("V0:45").await, Err(SendError::NotConnected)));
    }

    #[tokio::test]
    async fn test_open_failure_leaves_nothing_behind() {
        let mut device = MockSerialDevice::new();
        device.expect_info().returning(|| "COM3".to_string());
        device
            .expect_open()
            .returning(|_| Err(TransportError::PermissionDenied("COM3".to_string())));
        device.expect_close().never();
        let manager = SerialManager::new(provider_with(device), ManagerConfig::default());

        assert!(matches!(
            manager.connect().await,
            Err(ConnectError::DeviceOpenFailed(TransportError::PermissionDenied(_)))
        ));
        assert!(!manager.is_connected());
        assert!(manager.session.lock().await.is_none());
        assert!(!manager.writer.is_installed().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_is_closed_after_handshake_failure() {
        let (host, mut far_end) = tokio::io::duplex(4096);
        let (readable, writable) = tokio::io::split(host);

        let mut device = MockSerialDevice::new();
        device.expect_info().returning(|| "silent".to_string());
        device.expect_open().withf(|baud| *baud == 115_200).return_once(move |_| {
            Ok(DeviceChannels {
                readable: Box::new(readable),
                writable: Box::new(writable),
            })
        });
        device.expect_close().times(1).returning(|| Ok(()));

        let manager = SerialManager::new(provider_with(device), ManagerConfig::default());
        let start = tokio::time::Instant::now();
        let result = manager.connect().await;

        assert!(matches!(result, Err(ConnectError::HandshakeFailed { attempts: 5 })));
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert!(!manager.is_connected());
        assert!(!manager.writer.is_installed().await);

        let mut probes = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut far_end, &mut probes)
            .await
            .unwrap();
        assert_eq!(probes, "conn\n".repeat(5));
    }

    #[tokio::test]
    async fn test_close_error_is_swallowed() {
        let (host, mut far_end) = tokio::io::duplex(4096);
        let (readable, writable) = tokio::io::split(host);

        let mut device = MockSerialDevice::new();
        device.expect_info().returning(|| "flaky".to_string());
        device.expect_open().return_once(move |_| {
            Ok(DeviceChannels {
                readable: Box::new(readable),
                writable: Box::new(writable),
            })
        });
        device
            .expect_close()
            .times(1)
            .returning(|| Err(TransportError::ConnectionFailed("stuck".to_string())));

        let manager = SerialManager::new(provider_with(device), ManagerConfig::default());
        let echo = tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut buf = [0u8; 64];
            let _ = far_end.read(&mut buf).await;
            far_end.write_all(b"conn\r\n").await.unwrap();
            far_end
        });

        manager.connect().await.unwrap();
        assert!(manager.is_connected());
        assert_eq!(manager.device_info().as_deref(), Some("flaky"));

        manager.disconnect().await;
        assert!(!manager.is_connected());
        assert_eq!(manager.device_info(), None);
        drop(echo.await.unwrap());
    }

    #[tokio::test]
    async fn test_send_refused_after_device_closes_its_side() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (host, mut far_end) = tokio::io::duplex(4096);
        let (readable, writable) = tokio::io::split(host);

        let mut device = MockSerialDevice::new();
        device.expect_info().returning(|| "half-open".to_string());
        device.expect_open().return_once(move |_| {
            Ok(DeviceChannels {
                readable: Box::new(readable),
                writable: Box::new(writable),
            })
        });
        device.expect_close().times(1).returning(|| Ok(()));

        let manager = SerialManager::new(provider_with(device), ManagerConfig::default());
        let (hang_up_tx, hang_up_rx) = tokio::sync::oneshot::channel::<()>();
        let rig = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = far_end.read(&mut buf).await;
            far_end.write_all(b"conn\r\n").await.unwrap();
            let _ = hang_up_rx.await;
            // Only the device-to-host direction ends.
            far_end.shutdown().await.unwrap();
            far_end
        });

        manager.connect().await.unwrap();
        hang_up_tx.send(()).unwrap();
        let mut far_end = rig.await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while manager.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(matches!(manager.send("V0:45").await, Err(SendError::NotConnected)));
        assert!(matches!(
            manager.send_command(&Command::PumpThrottle(40)).await,
            Err(SendError::NotConnected)
        ));

        manager.disconnect().await;
        let mut written = String::new();
        far_end.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "");
    }
}
