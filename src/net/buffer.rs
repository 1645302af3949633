//! Packet buffer implementation
//!
//! Provides a byte buffer with the relay protocol's read/write primitives:
//! - Little-endian integers and 32-bit floats
//! - Raw UTF-8 text running to the end of the body
//! - UTF-8 text behind a 2-byte little-endian length prefix
//!
//! Reads are checked: running past the end of the buffer is an error, never
//! a silently zero-filled value.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Maximum byte length of a length-prefixed string
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

type ReadResult<T> = std::result::Result<T, ProtocolError>;

/// Packet buffer for reading and writing message bodies
#[derive(Debug, Clone, Default)]
pub struct PacketBuffer {
    /// Internal byte buffer
    data: BytesMut,
    /// Current read position
    read_pos: usize,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
            read_pos: 0,
        }
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            read_pos: 0,
        }
    }

    // ============ Properties ============

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Get a reference to the underlying bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Freeze the written bytes
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    /// Fail with `InsufficientData` unless `needed` bytes remain
    pub fn ensure_remaining(&self, context: &'static str, needed: usize) -> ReadResult<()> {
        if self.remaining() < needed {
            return Err(ProtocolError::InsufficientData {
                context,
                expected: needed,
                actual: self.remaining(),
            });
        }
        Ok(())
    }

    fn take(&mut self, context: &'static str, count: usize) -> ReadResult<&[u8]> {
        self.ensure_remaining(context, count)?;
        let start = self.read_pos;
        self.read_pos += count;
        Ok(&self.data[start..start + count])
    }

    // ============ Reading Methods (Little-Endian) ============

    /// Read an unsigned byte
    pub fn read_u8(&mut self, context: &'static str) -> ReadResult<u8> {
        Ok(self.take(context, 1)?[0])
    }

    /// Read an unsigned little-endian short (2 bytes)
    pub fn read_u16_le(&mut self, context: &'static str) -> ReadResult<u16> {
        let b = self.take(context, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a signed little-endian int (4 bytes)
    pub fn read_i32_le(&mut self, context: &'static str) -> ReadResult<i32> {
        let b = self.take(context, 4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian IEEE-754 single (4 bytes)
    pub fn read_f32_le(&mut self, context: &'static str) -> ReadResult<f32> {
        let b = self.take(context, 4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    // ============ String Reading ============

    /// Read every remaining byte as UTF-8 text.
    ///
    /// Invalid sequences become U+FFFD rather than failing the read.
    pub fn read_str_to_end(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.data[self.read_pos..]).into_owned();
        self.read_pos = self.data.len();
        text
    }

    /// Read UTF-8 text behind a 2-byte little-endian length prefix.
    ///
    /// Only a prefix that overruns the buffer fails; invalid sequences
    /// become U+FFFD.
    pub fn read_str_prefixed(&mut self, context: &'static str) -> ReadResult<String> {
        let length = self.read_u16_le(context)? as usize;
        Ok(String::from_utf8_lossy(self.take(context, length)?).into_owned())
    }

    // ============ Writing Methods (Little-Endian) ============

    /// Write an unsigned byte
    pub fn write_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Write an unsigned little-endian short (2 bytes)
    pub fn write_u16_le(&mut self, value: u16) {
        self.data.put_u16_le(value);
    }

    /// Write a signed little-endian int (4 bytes)
    pub fn write_i32_le(&mut self, value: i32) {
        self.data.put_i32_le(value);
    }

    /// Write a little-endian IEEE-754 single (4 bytes)
    pub fn write_f32_le(&mut self, value: f32) {
        self.data.put_f32_le(value);
    }

    // ============ String Writing ============

    /// Write UTF-8 text with no length marker
    pub fn write_str_raw(&mut self, value: &str) {
        self.data.put_slice(value.as_bytes());
    }

    /// Write UTF-8 text behind a 2-byte little-endian length prefix
    pub fn write_str_prefixed(&mut self, value: &str) -> ReadResult<()> {
        let bytes = value.as_bytes();
        if bytes.len() > MAX_STRING_LEN {
            return Err(ProtocolError::StringTooLong {
                length: bytes.len(),
                max: MAX_STRING_LEN,
            });
        }
        self.data.put_u16_le(bytes.len() as u16);
        self.data.put_slice(bytes);
        Ok(())
    }
}
