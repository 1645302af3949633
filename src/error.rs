//! Error handling module
//!
//! Defines custom error types for the relay server.

use std::io;

use thiserror::Error;

use crate::net::session::SessionId;

/// Main error type for the relay server
#[derive(Error, Debug)]
pub enum RelayError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send queue full for session {0}")]
    SendQueueFull(SessionId),

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Write error: {0}")]
    WriteError(String),
}

/// Protocol-specific errors
///
/// Framing and decode failures end the offending session. Encode failures
/// only fail the send that produced them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed frame: declared length {declared} is below header size {minimum}")]
    MalformedFrame { declared: u16, minimum: u16 },

    #[error("Unknown message kind: {0}")]
    UnknownMessage(u8),

    #[error("Insufficient data for {context}: expected {expected} bytes, got {actual}")]
    InsufficientData {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("String too long: {length} bytes (max: {max})")]
    StringTooLong { length: usize, max: usize },

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Whether this error is the peer going away rather than a fault
    pub fn is_disconnect(&self) -> bool {
        match self {
            RelayError::Network(NetworkError::ConnectionClosed) => true,
            RelayError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
