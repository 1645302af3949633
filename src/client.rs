//! Protocol client
//!
//! A conforming client for the relay protocol, built on the same codec as
//! the server. Used by the integration tests and the `relay-probe` binary.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, trace};

use crate::error::{RelayError, Result};
use crate::net::transport::FrameReader;
use crate::protocol::message::{ClientMessage, PlayerId, Position, ServerMessage};

/// Connected relay client
pub struct RelayClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    player_id: Option<PlayerId>,
}

impl RelayClient {
    /// Connect to a relay server
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(local = ?stream.local_addr().ok(), "Connected to relay");

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read_half),
            writer: write_half,
            player_id: None,
        })
    }

    /// Id assigned by the server on join
    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    /// Send one message
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let frame = message.to_frame()?;
        trace!(kind = %message.kind(), len = frame.len(), "Sending message");
        self.writer.write_all(&frame).await?;
        Ok(())
    }

    /// Send raw bytes, bypassing the codec
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    /// Join the game and wait for the login result.
    ///
    /// Returns the assigned id and spawn position.
    pub async fn join(&mut self, name: &str) -> Result<(PlayerId, Position)> {
        self.send(&ClientMessage::JoinGame {
            name: name.to_string(),
        })
        .await?;

        match self.recv().await? {
            Some(ServerMessage::LoginResult {
                player_id,
                position,
            }) => {
                self.player_id = Some(player_id);
                Ok((player_id, position))
            }
            Some(other) => Err(RelayError::Internal(format!(
                "expected login result, got {}",
                other.kind()
            ))),
            None => Err(RelayError::Internal(
                "connection closed before login result".to_string(),
            )),
        }
    }

    pub async fn send_move(&mut self, position: Position) -> Result<()> {
        self.send(&ClientMessage::Move { position }).await
    }

    pub async fn send_chat(&mut self, text: &str) -> Result<()> {
        self.send(&ClientMessage::Chat {
            text: text.to_string(),
        })
        .await
    }

    /// Send LEAVE_GAME. The server ends the session afterwards.
    pub async fn leave(&mut self) -> Result<()> {
        self.send(&ClientMessage::LeaveGame).await
    }

    /// Receive the next server message. `None` when the server closed.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>> {
        match self.reader.read_frame().await? {
            Some(frame) => Ok(Some(ServerMessage::decode(&frame)?)),
            None => Ok(None),
        }
    }

    /// Receive with a deadline. `None` on timeout or close.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<ServerMessage>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result,
            Err(_) => Ok(None),
        }
    }

    /// Close the write side; the server sees a disconnect
    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
