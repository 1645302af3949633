//! Connection handler module
//!
//! Handles the lifecycle of one client connection:
//! - Session creation and registration
//! - Writer task draining the session's outbound queue
//! - Read loop: frame, decode, dispatch to the registry
//! - Termination: deregistration, despawn, connection release

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::net::session::{Session, SessionState};
use crate::net::transport::{run_writer, FrameReader};
use crate::protocol::frame::Frame;
use crate::protocol::message::ClientMessage;
use crate::AppState;

/// How long queued frames may take to flush after the read loop ends
const WRITER_DRAIN_TIMEOUT_SECS: u64 = 5;

/// Connection handler for processing client connections
pub struct ConnectionHandler {
    /// Shared application state
    state: Arc<AppState>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Handle a TCP connection
    pub async fn handle_tcp(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(address = %addr, "Handling TCP connection");

        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        self.handle_connection(read_half, write_half, addr).await
    }

    /// Run a session over any pair of stream halves until it terminates.
    ///
    /// Every exit path ends in the same cleanup: the session is removed from
    /// the registry (broadcasting its despawn if it had joined) and the
    /// connection is released.
    pub async fn handle_connection<R, W>(
        &self,
        reader: R,
        writer: W,
        addr: SocketAddr,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (session, outbound_rx) = self.state.registry.create_session(addr);
        let session_id = session.id;
        let cancel = session.cancel_token().clone();

        let mut writer_task = tokio::spawn(run_writer(writer, outbound_rx, cancel.clone()));

        debug!(
            session_id = session_id,
            address = %addr,
            "Starting connection handler"
        );

        session.set_state(SessionState::Reading);
        self.process_connection(&session, FrameReader::new(reader)).await;

        debug!(session_id = session_id, "Connection handler ending");

        self.state.registry.on_disconnect(session_id);

        // The writer finishes once the last queue sender is gone, after
        // flushing whatever is still queued
        drop(session);
        let drain = Duration::from_secs(WRITER_DRAIN_TIMEOUT_SECS);
        let writer_result = match tokio::time::timeout(drain, &mut writer_task).await {
            Ok(joined) => joined,
            Err(_) => {
                debug!(session_id = session_id, "Writer did not drain in time");
                cancel.cancel();
                writer_task.await
            }
        };
        match writer_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!(session_id = session_id, error = %e, "Writer ended with error"),
            Err(e) => warn!(session_id = session_id, error = %e, "Writer task failed"),
        }

        info!(session_id = session_id, address = %addr, "Connection closed");
        Ok(())
    }

    /// Read and dispatch frames until the session ends
    async fn process_connection<R>(&self, session: &Arc<Session>, mut reader: FrameReader<R>)
    where
        R: AsyncRead + Unpin,
    {
        let cancel = session.cancel_token().clone();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session_id = session.id, "Session cancelled");
                    break;
                }
                next = reader.read_frame() => next,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(session_id = session.id, "Connection closed by peer");
                    break;
                }
                Err(e) if e.is_disconnect() => {
                    debug!(session_id = session.id, error = %e, "Connection lost");
                    break;
                }
                Err(e) => {
                    warn!(session_id = session.id, error = %e, "Connection error");
                    break;
                }
            };

            session.touch();

            match self.dispatch(session, frame) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(session_id = session.id, error = %e, "Dropping client after bad message");
                    break;
                }
            }
        }
    }

    /// Decode and route one frame. Returns false when the session should end.
    fn dispatch(&self, session: &Arc<Session>, frame: Frame) -> Result<bool> {
        let message = ClientMessage::decode(&frame)?;
        let registry = &self.state.registry;

        trace!(
            session_id = session.id,
            kind = %message.kind(),
            len = frame.body.len(),
            "Received message"
        );

        match message {
            ClientMessage::Login { text } => {
                info!(
                    session_id = session.id,
                    len = text.len(),
                    "Legacy LOGIN received, ignoring"
                );
            }
            ClientMessage::JoinGame { name } => {
                registry.on_join(session, name);
            }
            ClientMessage::LeaveGame => {
                registry.on_leave(session.id);
                return Ok(false);
            }
            ClientMessage::Move { position } => {
                registry.on_move(session, position);
            }
            ClientMessage::Chat { text } => {
                registry.on_chat(session, text);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::protocol::frame;
    use crate::protocol::message::{Position, ServerMessage};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::broadcast;

    fn test_state() -> Arc<AppState> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(AppState::new(ServerConfig::default(), shutdown_tx))
    }

    fn spawn_handler(state: &Arc<AppState>) -> (DuplexStream, tokio::task::JoinHandle<Result<()>>) {
        spawn_handler_with_buffer(state, 4096)
    }

    fn spawn_handler_with_buffer(
        state: &Arc<AppState>,
        max_buf_size: usize,
    ) -> (DuplexStream, tokio::task::JoinHandle<Result<()>>) {
        let (client, server) = tokio::io::duplex(max_buf_size);
        let (read_half, write_half) = tokio::io::split(server);
        let handler = ConnectionHandler::new(state.clone());
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let task = tokio::spawn(async move {
            handler.handle_connection(read_half, write_half, addr).await
        });
        (client, task)
    }

    async fn read_all_messages(client: &mut DuplexStream) -> Vec<ServerMessage> {
        let mut bytes = Vec::new();
        client.read_to_end(&mut bytes).await.unwrap();

        let mut messages = Vec::new();
        let mut offset = 0;
        while let Some((frame, used)) = frame::decode(&bytes[offset..]).unwrap() {
            messages.push(ServerMessage::decode(&frame).unwrap());
            offset += used;
        }
        assert_eq!(offset, bytes.len());
        messages
    }

    #[tokio::test]
    async fn test_join_then_leave() {
        let state = test_state();
        let (mut client, task) = spawn_handler(&state);

        let join = ClientMessage::JoinGame {
            name: "Alice".to_string(),
        };
        client.write_all(&join.to_frame().unwrap()).await.unwrap();
        client
            .write_all(&ClientMessage::LeaveGame.to_frame().unwrap())
            .await
            .unwrap();

        let messages = read_all_messages(&mut client).await;
        task.await.unwrap().unwrap();

        assert_eq!(
            messages,
            vec![ServerMessage::LoginResult {
                player_id: 1,
                position: Position::ORIGIN,
            }]
        );
        assert_eq!(state.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_session() {
        let state = test_state();
        let (mut client, task) = spawn_handler(&state);

        client.write_all(&[2, 0, 0xff]).await.unwrap();

        assert!(read_all_messages(&mut client).await.is_empty());
        task.await.unwrap().unwrap();
        assert_eq!(state.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_kind_closes_session() {
        let state = test_state();
        let (mut client, task) = spawn_handler(&state);

        client.write_all(&[3, 0, 42]).await.unwrap();

        assert!(read_all_messages(&mut client).await.is_empty());
        task.await.unwrap().unwrap();
        assert_eq!(state.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_legacy_login_keeps_session_open() {
        let state = test_state();
        let (mut client, task) = spawn_handler(&state);

        let login = ClientMessage::Login {
            text: "hello".to_string(),
        };
        client.write_all(&login.to_frame().unwrap()).await.unwrap();
        let join = ClientMessage::JoinGame {
            name: "Late".to_string(),
        };
        client.write_all(&join.to_frame().unwrap()).await.unwrap();
        client
            .write_all(&ClientMessage::LeaveGame.to_frame().unwrap())
            .await
            .unwrap();

        let messages = read_all_messages(&mut client).await;
        task.await.unwrap().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], ServerMessage::LoginResult { .. }));
    }

    #[tokio::test]
    async fn test_cancel_ends_session() {
        let state = test_state();
        let (mut client, task) = spawn_handler(&state);

        let join = ClientMessage::JoinGame {
            name: "Idle".to_string(),
        };
        client.write_all(&join.to_frame().unwrap()).await.unwrap();

        // Wait for the join to land, then cancel everything
        let mut header = [0u8; 3];
        client.read_exact(&mut header).await.unwrap();
        assert_eq!(header[2], 2);
        state.registry.disconnect_all();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(state.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_evicted_session_with_stalled_reader_terminates() {
        let state = test_state();
        // Too small for the login result; the client never reads
        let (mut client, task) = spawn_handler_with_buffer(&state, 8);

        let join = ClientMessage::JoinGame {
            name: "Slow".to_string(),
        };
        client.write_all(&join.to_frame().unwrap()).await.unwrap();

        for _ in 0..100 {
            if state.registry.player_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.registry.player_count(), 1);

        state.registry.disconnect_all();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(state.registry.count(), 0);
        drop(client);
    }

    #[tokio::test]
    async fn test_invalid_utf8_name_still_joins() {
        let state = test_state();
        let (mut client, task) = spawn_handler(&state);

        client.write_all(&[5, 0, 7, b'A', 0xff]).await.unwrap();
        client
            .write_all(&ClientMessage::LeaveGame.to_frame().unwrap())
            .await
            .unwrap();

        let messages = read_all_messages(&mut client).await;
        task.await.unwrap().unwrap();
        assert_eq!(
            messages,
            vec![ServerMessage::LoginResult {
                player_id: 1,
                position: Position::ORIGIN,
            }]
        );
    }
}
