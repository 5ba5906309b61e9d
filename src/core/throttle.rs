//! Debounced pump throttle sender
//!
//! Throttle values tend to arrive in bursts (slider drags, key repeat). Only
//! the last value of a burst is written, once no new value has arrived for
//! the debounce window, and only when it differs from the last value sent.

use crate::core::manager::SerialManager;
use crate::core::protocol::{Command, CommandError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default quiet period before a throttle value is written
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

enum ThrottleInput {
    Set(u8),
    Discard,
}

/// Debounces throttle updates toward a [`SerialManager`].
///
/// Dropping the sender discards any pending value.
pub struct ThrottleSender {
    input_tx: mpsc::UnboundedSender<ThrottleInput>,
    last_sent: Arc<Mutex<Option<u8>>>,
    cancel: CancellationToken,
}

impl ThrottleSender {
    /// Start the debounce task. Must be called inside a Tokio runtime.
    pub fn new(manager: Arc<SerialManager>, debounce: Duration) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let last_sent = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        tokio::spawn(run_debounce(
            manager,
            debounce,
            input_rx,
            last_sent.clone(),
            cancel.clone(),
        ));

        Self {
            input_tx,
            last_sent,
            cancel,
        }
    }

    /// Queue a throttle percentage, restarting the debounce window
    pub fn set(&self, percent: u8) -> Result<(), CommandError> {
        Command::pump_throttle(percent)?;
        // The task only goes away after cancellation.
        let _ = self.input_tx.send(ThrottleInput::Set(percent));
        Ok(())
    }

    /// Drop the pending value, if any
    pub fn cancel(&self) {
        let _ = self.input_tx.send(ThrottleInput::Discard);
    }

    /// Last value written to the device
    pub fn last_sent(&self) -> Option<u8> {
        *self.last_sent.lock()
    }
}

impl Drop for ThrottleSender {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_debounce(
    manager: Arc<SerialManager>,
    debounce: Duration,
    mut input_rx: mpsc::UnboundedReceiver<ThrottleInput>,
    last_sent: Arc<Mutex<Option<u8>>>,
    cancel: CancellationToken,
) {
    let mut pending: Option<u8> = None;
    let deadline = tokio::time::sleep(debounce);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            input = input_rx.recv() => match input {
                Some(ThrottleInput::Set(percent)) => {
                    pending = Some(percent);
                    deadline.as_mut().reset(Instant::now() + debounce);
                }
                Some(ThrottleInput::Discard) => pending = None,
                None => break,
            },
            () = &mut deadline, if pending.is_some() => {
                if let Some(percent) = pending.take() {
                    flush(&manager, percent, &last_sent).await;
                }
            }
        }
    }
    debug!("Throttle sender stopped");
}

async fn flush(manager: &SerialManager, percent: u8, last_sent: &Mutex<Option<u8>>) {
    if !manager.is_connected() {
        debug!(percent, "Throttle dropped, not connected");
        return;
    }
    if *last_sent.lock() == Some(percent) {
        return;
    }

    match manager.send_command(&Command::PumpThrottle(percent)).await {
        Ok(()) => *last_sent.lock() = Some(percent),
        Err(e) => warn!(percent, error = %e, "Failed to send throttle"),
    }
}
