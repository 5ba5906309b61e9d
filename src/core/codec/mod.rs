//! Stream adapters between the serial byte channels and protocol text
//!
//! The inbound raw-byte channel is wrapped in a [`TextDecoder`] to yield a
//! stream of text chunks; the outbound channel is wrapped in a
//! [`TextEncoder`] so lines can be written as strings.

mod text;

pub use text::{TextDecoder, TextEncoder};

use crate::core::transport::{BoxedReader, BoxedWriter};
use tokio_util::codec::{FramedRead, FramedWrite};

/// Decoded inbound text stream
pub type TextReader = FramedRead<BoxedReader, TextDecoder>;

/// Encoded outbound text sink
pub type TextWriter = FramedWrite<BoxedWriter, TextEncoder>;

/// Install the decode adapter on a raw inbound channel
pub fn text_reader(readable: BoxedReader) -> TextReader {
    FramedRead::new(readable, TextDecoder::new())
}

/// Install the encode adapter on a raw outbound channel
pub fn text_writer(writable: BoxedWriter) -> TextWriter {
    FramedWrite::new(writable, TextEncoder::new())
}
