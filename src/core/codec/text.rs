//! UTF-8 text adapters for the serial byte streams

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Decode adapter: raw bytes in, text chunks out.
///
/// A multi-byte sequence cut by a read boundary is held back until the rest
/// arrives. Invalid bytes become U+FFFD.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

impl TextDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for TextDecoder {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut text = String::new();
        let mut consumed = 0;

        while consumed < src.len() {
            match std::str::from_utf8(&src[consumed..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    consumed = src.len();
                }
                Err(e) => {
                    let valid_end = consumed + e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&src[consumed..valid_end]));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + len;
                        }
                        // Incomplete sequence at the end, wait for more bytes
                        None => {
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        src.advance(consumed);
        Ok((!text.is_empty()).then_some(text))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(text) = self.decode(buf)? {
            return Ok(Some(text));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let tail = String::from_utf8_lossy(buf).into_owned();
        buf.clear();
        Ok(Some(tail))
    }
}

/// Encode adapter: text in, raw UTF-8 bytes out
#[derive(Debug, Clone, Copy, Default)]
pub struct TextEncoder;

impl TextEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<String> for TextEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}
