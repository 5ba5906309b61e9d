//! Read pump
//!
//! Background task that owns the decoded inbound stream for one connection.
//! Each chunk goes through the line framer; resulting lines are recorded for
//! the handshake and handed to the line observer in arrival order. The pump
//! never restarts itself.

use crate::core::codec::TextReader;
use crate::core::events::EventDispatcher;
use crate::core::handshake::VerificationBuffer;
use crate::core::protocol::LineFramer;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why the pump stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    /// Cancelled by `disconnect()`
    Cancelled,
    /// The device closed the stream
    EndOfStream,
    /// The inbound channel failed
    ReadError(String),
}

/// Everything the pump shares with the connection manager
pub(crate) struct ReadPump {
    pub(crate) reader: TextReader,
    pub(crate) framer: LineFramer,
    pub(crate) buffer: Arc<VerificationBuffer>,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) cancel: CancellationToken,
}

impl ReadPump {
    /// Drain the inbound stream until cancelled, end of stream, or error.
    ///
    /// `on_link_lost` runs on the pump task when the stream ends by itself.
    pub(crate) async fn run<F>(mut self, on_link_lost: F) -> PumpExit
    where
        F: FnOnce(),
    {
        let exit = loop {
            let chunk = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break PumpExit::Cancelled,
                chunk = self.reader.next() => chunk,
            };

            match chunk {
                Some(Ok(text)) => {
                    let lines = self.framer.push(&text);
                    self.deliver(&lines);
                }
                Some(Err(e)) => break PumpExit::ReadError(e.to_string()),
                None => break PumpExit::EndOfStream,
            }
        };

        if exit != PumpExit::Cancelled {
            if let Some(tail) = self.framer.finish() {
                self.deliver(&[tail]);
            }
            warn!(?exit, "Read pump stopped");
            on_link_lost();
        } else {
            debug!("Read pump cancelled");
        }
        exit
    }

    fn deliver(&self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        self.buffer.extend(lines);
        for line in lines {
            debug!(%line, "Received");
            self.dispatcher.dispatch_line(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::text_reader;
    use crate::core::protocol::FramingMode;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn pump_over(
        io: tokio_test::io::Mock,
        mode: FramingMode,
    ) -> (ReadPump, Arc<Mutex<Vec<String>>>, Arc<VerificationBuffer>) {
        let dispatcher = Arc::new(EventDispatcher::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher.on_receive(move |line| sink.lock().push(line.to_string()));

        let buffer = Arc::new(VerificationBuffer::new());
        let pump = ReadPump {
            reader: text_reader(Box::new(io)),
            framer: LineFramer::new(mode),
            buffer: buffer.clone(),
            dispatcher,
            cancel: CancellationToken::new(),
        };
        (pump, seen, buffer)
    }

    #[tokio::test]
    async fn test_lines_delivered_in_order() {
        let io = tokio_test::io::Builder::new()
            .read(b"boot\r\nV0:1")
            .read(b"0\r\nV1:20\r\n")
            .build();
        let (pump, seen, buffer) = pump_over(io, FramingMode::CarryOver);
        buffer.begin();

        let lost = Arc::new(AtomicBool::new(false));
        let flag = lost.clone();
        let exit = pump.run(move || flag.store(true, Ordering::SeqCst)).await;

        assert_eq!(exit, PumpExit::EndOfStream);
        assert!(lost.load(Ordering::SeqCst));
        assert_eq!(*seen.lock(), vec!["boot", "V0:10", "V1:20"]);
        assert!(buffer.contains("V1:20"));
    }

    #[tokio::test]
    async fn test_chunk_mode_keeps_fragments() {
        let io = tokio_test::io::Builder::new().read(b"co").read(b"nn\n").build();
        let (pump, seen, _) = pump_over(io, FramingMode::Chunk);
        pump.run(|| {}).await;
        assert_eq!(*seen.lock(), vec!["co", "nn"]);
    }

    #[tokio::test]
    async fn test_tail_flushed_at_end_of_stream() {
        let io = tokio_test::io::Builder::new().read(b"V2:5\nV2:").read(b"6").build();
        let (pump, seen, _) = pump_over(io, FramingMode::CarryOver);
        pump.run(|| {}).await;
        assert_eq!(*seen.lock(), vec!["V2:5", "V2:6"]);
    }

    #[tokio::test]
    async fn test_read_error_stops_pump() {
        let io = tokio_test::io::Builder::new()
            .read(b"V0:1\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let (pump, seen, _) = pump_over(io, FramingMode::CarryOver);

        let exit = pump.run(|| {}).await;
        assert!(matches!(exit, PumpExit::ReadError(_)));
        assert_eq!(*seen.lock(), vec!["V0:1"]);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_read() {
        let (host, _device) = tokio::io::duplex(64);
        let (readable, _writable) = tokio::io::split(host);
        let cancel = CancellationToken::new();
        let pump = ReadPump {
            reader: text_reader(Box::new(readable)),
            framer: LineFramer::default(),
            buffer: Arc::new(VerificationBuffer::new()),
            dispatcher: Arc::new(EventDispatcher::new()),
            cancel: cancel.clone(),
        };

        let lost = Arc::new(AtomicBool::new(false));
        let flag = lost.clone();
        let task = tokio::spawn(pump.run(move || flag.store(true, Ordering::SeqCst)));
        tokio::task::yield_now().await;

        cancel.cancel();
        assert_eq!(task.await.unwrap(), PumpExit::Cancelled);
        assert!(!lost.load(Ordering::SeqCst));
    }
}
