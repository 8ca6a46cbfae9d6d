//! Wire framing for the raw TCP transport.
//!
//! Frames are laid out as `[tag "cmdmgt"][length: i32 big-endian][payload]`.
//! The decoder keeps a reassembly buffer across reads so frames split over
//! several segments, or several frames packed into one segment, come out
//! whole and in order. Bytes that never line up with a tag are dropped once
//! they exceed the configured maximum message size.
//!
//! A zero-length frame carries no data and is used as the keepalive.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::error::CodecError;

/// Fixed marker that opens every frame.
pub const FRAME_TAG: &[u8; 6] = b"cmdmgt";

/// Size of the big-endian length field.
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Tag plus length field.
pub const HEADER_SIZE: usize = FRAME_TAG.len() + LENGTH_FIELD_SIZE;

/// Default upper bound for a single payload received over TCP.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10_240;

/// Frame encoder/decoder with a persistent reassembly buffer.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_message_size: usize,
    buffer: BytesMut,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl FrameCodec {
    /// Creates a codec accepting payloads up to `max_message_size` bytes.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            buffer: BytesMut::new(),
        }
    }

    /// Returns the maximum accepted payload size.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Returns the number of bytes waiting in the reassembly buffer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Encodes a payload as a complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::PayloadTooLarge`] if the payload length does not
    /// fit the signed 32-bit length field.
    pub fn encode_frame(payload: &[u8]) -> Result<Bytes, CodecError> {
        let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        write_frame(payload, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Appends newly read bytes and returns every payload completed by them.
    ///
    /// Partial frames stay buffered for the next call.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);

        let mut payloads = Vec::new();
        while let Some(payload) = next_frame(&mut self.buffer, self.max_message_size) {
            payloads.push(payload);
        }
        payloads
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(next_frame(src, self.max_message_size))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload) = self.decode(src)? {
            return Ok(Some(payload));
        }
        if !src.is_empty() {
            debug!(remaining = src.len(), "discarding incomplete frame at end of stream");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        write_frame(&item, dst)
    }
}

fn write_frame(payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
    let length =
        i32::try_from(payload.len()).map_err(|_| CodecError::PayloadTooLarge(payload.len()))?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(FRAME_TAG);
    dst.put_i32(length);
    dst.put_slice(payload);
    Ok(())
}

/// Extracts the next complete payload from `buf`, consuming it.
fn next_frame(buf: &mut BytesMut, max_message_size: usize) -> Option<Bytes> {
    loop {
        let Some(start) = find_tag(buf) else {
            if buf.len() > max_message_size {
                warn!(
                    discarded = buf.len(),
                    max = max_message_size,
                    "protocol error: no frame tag in oversized buffer"
                );
                buf.clear();
            }
            return None;
        };

        if start > 0 {
            debug!(skipped = start, "skipping bytes before frame tag");
            buf.advance(start);
        }

        if buf.len() < HEADER_SIZE {
            return None;
        }

        let mut length_field = [0u8; LENGTH_FIELD_SIZE];
        length_field.copy_from_slice(&buf[FRAME_TAG.len()..HEADER_SIZE]);
        let raw_length = i32::from_be_bytes(length_field);

        let length = match usize::try_from(raw_length) {
            Ok(length) if length <= max_message_size => length,
            _ => {
                warn!(
                    length = raw_length,
                    max = max_message_size,
                    "protocol error: frame length out of range"
                );
                buf.advance(1);
                continue;
            }
        };

        if buf.len() < HEADER_SIZE + length {
            return None;
        }

        buf.advance(HEADER_SIZE);
        return Some(buf.split_to(length).freeze());
    }
}

fn find_tag(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_TAG.len())
        .position(|window| window == FRAME_TAG.as_slice())
}
