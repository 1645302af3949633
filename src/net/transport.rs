//! Transport module
//!
//! Moves frames between a byte stream and the rest of the server:
//! - `FrameReader` buffers the read half and yields whole frames
//! - `run_writer` drains a session's outbound queue into the write half
//!
//! Both are generic over tokio's `AsyncRead` / `AsyncWrite` so tests can run
//! them against in-memory mocks instead of sockets.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{NetworkError, RelayError, Result};
use crate::protocol::frame::{self, Frame, LENGTH_FIELD_SIZE, MAX_FRAME_SIZE};

/// Size of a single socket read
const READ_CHUNK_SIZE: usize = 4096;

/// Buffered frame reader over the read half of a connection
pub struct FrameReader<R> {
    reader: R,
    read_buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a new frame reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            read_buffer: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` when the peer closes the stream between frames.
    /// A close in the middle of a frame is `ConnectionClosed`. A declared
    /// length below the header size fails before any body bytes are read.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        if !self.fill_to(LENGTH_FIELD_SIZE).await? {
            if self.read_buffer.is_empty() {
                return Ok(None);
            }
            return Err(RelayError::Network(NetworkError::ConnectionClosed));
        }

        let declared =
            frame::decode_header([self.read_buffer[0], self.read_buffer[1]])? as usize;

        if !self.fill_to(declared).await? {
            return Err(RelayError::Network(NetworkError::ConnectionClosed));
        }

        let mut data = self.read_buffer.split_to(declared);
        let rest = data.split_off(LENGTH_FIELD_SIZE).freeze();
        let frame = Frame::from_parts(rest)?;

        trace!(kind = frame.kind, len = declared, "Read frame");
        Ok(Some(frame))
    }

    /// Number of bytes buffered but not yet consumed
    pub fn buffered_len(&self) -> usize {
        self.read_buffer.len()
    }

    /// Read until at least `n` bytes are buffered. Returns false on EOF.
    async fn fill_to(&mut self, n: usize) -> Result<bool> {
        while self.read_buffer.len() < n {
            self.read_buffer.reserve(READ_CHUNK_SIZE);
            let bytes_read = self
                .reader
                .read_buf(&mut self.read_buffer)
                .await
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof => RelayError::Io(e),
                    _ => RelayError::Network(NetworkError::ReadError(e.to_string())),
                })?;
            if bytes_read == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Write every queued frame to `writer` until the queue closes or `cancel`
/// fires. Each frame is written and flushed on its own.
///
/// Cancellation also interrupts a write in progress, so a peer that stops
/// reading cannot hold the task once its session is cancelled.
pub async fn run_writer<W>(
    mut writer: W,
    mut outbound_rx: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let data = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            next = outbound_rx.recv() => match next {
                Some(data) => data,
                None => break,
            },
        };

        let written = tokio::select! {
            _ = cancel.cancelled() => {
                trace!(len = data.len(), "Write interrupted by cancel");
                return Ok(());
            }
            written = write_frame(&mut writer, &data) => written,
        };
        written.map_err(|e| RelayError::Network(NetworkError::WriteError(e.to_string())))?;
    }

    // Best effort; the peer may already be gone
    let _ = writer.shutdown().await;
    Ok(())
}

async fn write_frame<W>(writer: &mut W, data: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(data).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use std::time::Duration;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_single_frame() {
        let mock = Builder::new().read(&[6, 0, 7, b'B', b'o', b'b']).build();
        let mut reader = FrameReader::new(mock);

        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame, Frame::new(7, b"Bob".to_vec()));
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_split_across_reads() {
        let mock = Builder::new()
            .read(&[5])
            .read(&[0, 3])
            .read(&[0xaa])
            .read(&[0xbb, 3, 0, 8])
            .build();
        let mut reader = FrameReader::new(mock);

        let first = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(first, Frame::new(3, vec![0xaa, 0xbb]));

        // Second frame arrived in the same chunk as the tail of the first
        let second = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(second.kind, 8);
        assert!(second.body.is_empty());
        assert_eq!(reader.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_read_rejects_short_length_before_body() {
        for declared in [0u8, 1, 2] {
            let mock = Builder::new().read(&[declared, 0]).build();
            let mut reader = FrameReader::new(mock);

            let err = reader.read_frame().await.unwrap_err();
            assert!(matches!(
                err,
                RelayError::Protocol(ProtocolError::MalformedFrame { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_read_eof_mid_frame() {
        let mock = Builder::new().read(&[10, 0, 3, 1, 2]).build();
        let mut reader = FrameReader::new(mock);

        let err = reader.read_frame().await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_read_eof_inside_length_field() {
        let mock = Builder::new().read(&[10]).build();
        let mut reader = FrameReader::new(mock);

        assert!(reader.read_frame().await.unwrap_err().is_disconnect());
    }

    #[tokio::test]
    async fn test_read_clean_eof() {
        let mock = Builder::new().build();
        let mut reader = FrameReader::new(mock);

        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_io_error() {
        let mock = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let mut reader = FrameReader::new(mock);

        assert!(reader.read_frame().await.unwrap_err().is_disconnect());
    }

    #[tokio::test]
    async fn test_writer_writes_in_order() {
        let first = frame::encode(4, &[1, 2]).unwrap();
        let second = frame::encode(10, &[3, 0, 0, 0]).unwrap();

        let mock = Builder::new().write(&first).write(&second).build();
        let (tx, rx) = mpsc::channel(8);
        tx.send(first.clone()).await.unwrap();
        tx.send(second.clone()).await.unwrap();
        drop(tx);

        run_writer(mock, rx, CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_cancel_interrupts_blocked_write() {
        // The peer never reads, so a frame larger than the pipe blocks
        let (_peer, server) = tokio::io::duplex(8);
        let (tx, rx) = mpsc::channel(8);
        tx.send(frame::encode(9, &[0u8; 32]).unwrap()).await.unwrap();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_writer(server, rx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_writer_stops_on_cancel() {
        let mock = Builder::new().build();
        let (_tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_writer(mock, rx, cancel.clone()));
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
