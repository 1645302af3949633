//! Frame codec
//!
//! Every unit on the wire is `[length: u16 LE][kind: u8][body]`, where
//! `length` counts the whole frame including its own two bytes. The codec is
//! a pure transformation; reading the bytes off a stream lives in
//! `net::transport`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Size of the length field
pub const LENGTH_FIELD_SIZE: usize = 2;

/// Size of the full header (length field + kind byte)
pub const HEADER_SIZE: usize = 3;

/// Largest frame the length field can describe
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Largest body that still fits in a frame
pub const MAX_BODY_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// One decoded frame: the raw kind byte and its body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub body: Bytes,
}

impl Frame {
    pub fn new(kind: u8, body: impl Into<Bytes>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    /// Split the bytes following the length field into kind and body.
    ///
    /// `rest` must be exactly `declared_length - 2` bytes long.
    pub fn from_parts(rest: Bytes) -> Result<Self, ProtocolError> {
        if rest.is_empty() {
            return Err(ProtocolError::InsufficientData {
                context: "frame kind",
                expected: 1,
                actual: 0,
            });
        }
        let kind = rest[0];
        Ok(Self {
            kind,
            body: rest.slice(1..),
        })
    }

    /// Encode this frame back to wire bytes
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        encode(self.kind, &self.body)
    }

    /// Total on-wire size of this frame
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Encode a kind byte and body into a complete frame
pub fn encode(kind: u8, body: &[u8]) -> Result<Bytes, ProtocolError> {
    let size = HEADER_SIZE + body.len();
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = BytesMut::with_capacity(size);
    frame.put_u16_le(size as u16);
    frame.put_u8(kind);
    frame.put_slice(body);
    Ok(frame.freeze())
}

/// Read the declared frame length from the first two bytes.
///
/// Rejects any length smaller than the header, before a body read is
/// attempted.
pub fn decode_header(header: [u8; LENGTH_FIELD_SIZE]) -> Result<u16, ProtocolError> {
    let declared = u16::from_le_bytes(header);
    if (declared as usize) < HEADER_SIZE {
        return Err(ProtocolError::MalformedFrame {
            declared,
            minimum: HEADER_SIZE as u16,
        });
    }
    Ok(declared)
}

/// Decode one complete frame from a contiguous buffer.
///
/// Returns the frame and the number of bytes it occupied, or `None` when
/// `buf` does not yet hold a whole frame.
pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    if buf.len() < LENGTH_FIELD_SIZE {
        return Ok(None);
    }
    let declared = decode_header([buf[0], buf[1]])? as usize;
    if buf.len() < declared {
        return Ok(None);
    }
    let frame = Frame::from_parts(Bytes::copy_from_slice(&buf[LENGTH_FIELD_SIZE..declared]))?;
    Ok(Some((frame, declared)))
}
