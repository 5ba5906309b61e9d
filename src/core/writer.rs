//! Outbound line writer
//!
//! Owns the encoded outbound channel for the lifetime of a connection.
//! Writes fail with [`SendError::NotConnected`] whenever no channel is
//! installed; nothing is queued.

use crate::core::codec::TextWriter;
use crate::core::error::SendError;
use futures::SinkExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Slot holding the outbound text sink
#[derive(Default)]
pub(crate) struct LineWriter {
    slot: Mutex<Option<TextWriter>>,
}

impl LineWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Install the sink of a freshly opened connection
    pub(crate) async fn install(&self, writer: TextWriter) {
        *self.slot.lock().await = Some(writer);
    }

    #[cfg(test)]
    pub(crate) async fn is_installed(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Write `text` followed by LF as one write
    pub(crate) async fn send_line(&self, text: &str) -> Result<(), SendError> {
        let mut slot = self.slot.lock().await;
        let writer = slot.as_mut().ok_or(SendError::NotConnected)?;

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        writer.send(line).await?;
        debug!(line = text, "Sent");
        Ok(())
    }

    /// Remove the sink and close it gracefully.
    ///
    /// The slot is empty afterwards even when closing fails.
    pub(crate) async fn close(&self) -> std::io::Result<()> {
        let writer = self.slot.lock().await.take();
        match writer {
            Some(mut writer) => writer.close().await,
            None => Ok(()),
        }
    }
}
