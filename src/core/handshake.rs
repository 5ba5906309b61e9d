//! Connection verification handshake
//!
//! After the port opens, the host sends the probe token and waits for the
//! firmware to echo it back as a line. Each attempt clears the verification
//! buffer, sends one probe and waits up to the attempt timeout. Worst case
//! latency is `attempts * timeout`.

use crate::core::error::{ConnectError, SendError};
use crate::core::protocol::PROBE_TOKEN;
use crate::core::writer::LineWriter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Handshake parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Token sent and expected back
    pub probe_token: String,
    /// Number of probes before giving up
    pub attempts: u32,
    /// How long to wait for the echo after each probe
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            probe_token: PROBE_TOKEN.to_string(),
            attempts: 5,
            timeout: Duration::from_millis(300),
        }
    }
}

impl HandshakeConfig {
    /// Upper bound of the time spent verifying
    pub fn worst_case(&self) -> Duration {
        self.timeout * self.attempts
    }
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Lines seen by the read pump while a handshake is running.
///
/// Recording is off outside of `connect()`, so the buffer never grows during
/// normal operation.
#[derive(Debug, Default)]
pub struct VerificationBuffer {
    lines: Mutex<Option<Vec<String>>>,
    notify: Notify,
}

impl VerificationBuffer {
    /// Create an idle buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording with an empty buffer
    pub fn begin(&self) {
        *self.lines.lock() = Some(Vec::new());
    }

    /// Stop recording and drop the content
    pub fn end(&self) {
        *self.lines.lock() = None;
    }

    /// Whether lines are being recorded
    pub fn is_recording(&self) -> bool {
        self.lines.lock().is_some()
    }

    /// Record lines from the pump and wake any waiter
    pub fn extend(&self, new_lines: &[String]) {
        {
            let mut lines = self.lines.lock();
            let Some(lines) = lines.as_mut() else { return };
            lines.extend_from_slice(new_lines);
        }
        self.notify.notify_waiters();
    }

    /// Whether a recorded line equals `expected`
    pub fn contains(&self, expected: &str) -> bool {
        self.lines
            .lock()
            .as_ref()
            .is_some_and(|lines| lines.iter().any(|l| l == expected))
    }

    /// Wait until `expected` is recorded or `timeout` elapses
    pub async fn wait_for(&self, expected: &str, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                // Register before checking so a line landing in between is not missed.
                notified.as_mut().enable();
                if self.contains(expected) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

/// Bounded probe/acknowledge loop
#[derive(Debug, Clone)]
pub struct HandshakeVerifier {
    config: HandshakeConfig,
}

impl HandshakeVerifier {
    /// Create a verifier
    pub fn new(config: HandshakeConfig) -> Self {
        Self { config }
    }

    /// Handshake parameters
    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Run the handshake. Returns the number of probes sent on success.
    pub(crate) async fn verify(
        &self,
        writer: &LineWriter,
        buffer: &VerificationBuffer,
    ) -> Result<u32, ConnectError> {
        let token = self.config.probe_token.as_str();
        let result = self.probe_loop(writer, buffer, token).await;
        buffer.end();
        result
    }

    async fn probe_loop(
        &self,
        writer: &LineWriter,
        buffer: &VerificationBuffer,
        token: &str,
    ) -> Result<u32, ConnectError> {
        for attempt in 1..=self.config.attempts {
            buffer.begin();
            writer.send_line(token).await.map_err(|e| match e {
                SendError::Io(io) => ConnectError::ProbeWrite(io),
                other => ConnectError::ProbeWrite(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    other.to_string(),
                )),
            })?;
            debug!(attempt, "Handshake probe sent");

            if buffer.wait_for(token, self.config.timeout).await {
                info!(attempt, "Handshake acknowledged");
                return Ok(attempt);
            }
        }

        warn!(attempts = self.config.attempts, "Handshake not acknowledged");
        Err(ConnectError::HandshakeFailed {
            attempts: self.config.attempts,
        })
    }
}
