//! Frame encoder.

use crate::error::{CodecError, CodecResult};
use crate::frame::{Message, FIELD_SEPARATOR, HEADER_FLAG, MAX_HEADER_LEN, MESSAGE_SEPARATOR};
use crate::varint;
use bytes::{BufMut, Bytes, BytesMut};

/// Default upper bound for a single frame.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Minimum fresh allocation when the arena runs dry.
pub const DEFAULT_CHUNK_CAPACITY: usize = 64 * 1024;

/// Encodes a message with a throwaway encoder.
///
/// Prefer a long-lived [`FrameEncoder`] on hot paths.
pub fn to_frame(message: &Message) -> CodecResult<Bytes> {
    FrameEncoder::new().encode(message)
}

/// A frame encoder backed by a reusable byte arena.
///
/// Frames are written into one `BytesMut` and split off as owned [`Bytes`],
/// so a returned frame stays valid for as long as the caller holds it. The
/// arena hands out the spare capacity of its current chunk and reserves a
/// new chunk (at least [`DEFAULT_CHUNK_CAPACITY`]) once the next frame does
/// not fit; a chunk is only reclaimed after every frame carved from it has
/// been dropped.
pub struct FrameEncoder {
    buffer: BytesMut,
    chunk_capacity: usize,
    max_packet_size: usize,
}

impl FrameEncoder {
    /// Create an encoder with default limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CHUNK_CAPACITY, DEFAULT_MAX_PACKET_SIZE)
    }

    /// Create an encoder with an explicit chunk size and packet limit.
    pub fn with_limits(chunk_capacity: usize, max_packet_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(chunk_capacity),
            chunk_capacity,
            max_packet_size,
        }
    }

    /// Returns the maximum frame size this encoder accepts.
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Encode one message into a terminated frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::PacketTooLarge`] when the frame would exceed
    /// the packet limit and [`CodecError::HeaderTooLarge`] when the
    /// length header does not fit its one-byte size prefix. Nothing is
    /// written on error.
    pub fn encode(&mut self, message: &Message) -> CodecResult<Bytes> {
        let header = if message.args.iter().any(|arg| needs_escape(arg)) {
            Some(length_header(&message.args)?)
        } else {
            None
        };

        let action = message.action.code().as_bytes();
        let args_len: usize = message.args.iter().map(String::len).sum();
        let size = match &header {
            // flag + header + topic + sep + action + sep + args + terminator
            Some(header) => 1 + header.len() + 1 + 1 + action.len() + 1 + args_len + 1,
            // topic + sep + action + (sep + arg)* + terminator
            None => 1 + 1 + action.len() + message.args.len() + args_len + 1,
        };
        if size > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size,
                max: self.max_packet_size,
            });
        }

        self.reserve(size);
        match header {
            Some(header) => {
                #[allow(clippy::cast_possible_truncation)]
                let flag = HEADER_FLAG | header.len() as u8;
                self.buffer.put_u8(flag);
                self.buffer.put_slice(&header);
                self.buffer.put_u8(message.topic.code());
                self.buffer.put_u8(FIELD_SEPARATOR);
                self.buffer.put_slice(action);
                self.buffer.put_u8(FIELD_SEPARATOR);
                for arg in &message.args {
                    self.buffer.put_slice(arg.as_bytes());
                }
            }
            None => {
                self.buffer.put_u8(message.topic.code());
                self.buffer.put_u8(FIELD_SEPARATOR);
                self.buffer.put_slice(action);
                for arg in &message.args {
                    self.buffer.put_u8(FIELD_SEPARATOR);
                    self.buffer.put_slice(arg.as_bytes());
                }
            }
        }
        self.buffer.put_u8(MESSAGE_SEPARATOR);

        Ok(self.buffer.split().freeze())
    }

    fn reserve(&mut self, size: usize) {
        if self.buffer.capacity() - self.buffer.len() < size {
            self.buffer.reserve(size.max(self.chunk_capacity));
        }
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn needs_escape(arg: &str) -> bool {
    arg.bytes()
        .any(|b| b == FIELD_SEPARATOR || b == MESSAGE_SEPARATOR)
}

fn length_header(args: &[String]) -> CodecResult<Vec<u8>> {
    let mut header = Vec::with_capacity(args.len());
    for arg in args {
        varint::encode(arg.len(), &mut header);
    }
    if header.len() > MAX_HEADER_LEN {
        return Err(CodecError::HeaderTooLarge(header.len()));
    }
    Ok(header)
}
