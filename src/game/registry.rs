//! Session registry and broadcast engine
//!
//! Tracks every live session and implements the fan-out rules:
//! - join: login result to the joiner, existing players to the joiner,
//!   then the joiner to everyone else
//! - move / chat: to every other joined session
//! - leave / disconnect: one despawn to every other joined session
//!
//! Sends never wait. Each recipient has a bounded queue; a recipient whose
//! queue is full is evicted (its session is cancelled and runs the normal
//! termination path) so one slow client cannot stall a broadcast.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::{NetworkError, RelayError};
use crate::game::player::Player;
use crate::net::session::{Session, SessionId, SessionState};
use crate::protocol::message::{Position, ServerMessage};

/// Default per-session outbound queue capacity
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Thread-safe registry of live sessions
pub struct SessionRegistry {
    /// Map of session ID to session
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Next session ID to assign
    next_id: AtomicI32,
    /// Held exclusively by join and despawn, shared by move and chat fan-out,
    /// so no recipient sees a player's MOVE before its SPAWN or after its
    /// DESPAWN
    membership: RwLock<()>,
    /// Outbound queue capacity for new sessions
    outbound_capacity: usize,
}

impl SessionRegistry {
    /// Create a registry with the default queue capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTBOUND_CAPACITY)
    }

    /// Create a registry whose sessions get `outbound_capacity` queued frames
    pub fn with_capacity(outbound_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicI32::new(1),
            membership: RwLock::new(()),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Allocate a session id. Ids are never reused while the server runs.
    pub fn next_session_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Create a session with a fresh id and outbound queue, and register it.
    ///
    /// The returned receiver feeds the connection's writer task.
    pub fn create_session(&self, address: SocketAddr) -> (Arc<Session>, mpsc::Receiver<Bytes>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_capacity);
        let session = Arc::new(Session::new(self.next_session_id(), address, outbound_tx));
        self.register(session.clone());
        (session, outbound_rx)
    }

    /// Register a session before its read loop starts
    pub fn register(&self, session: Arc<Session>) {
        info!(
            session_id = session.id,
            address = %session.address,
            "Session registered"
        );
        self.sessions.insert(session.id, session);
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|r| r.clone())
    }

    /// Get the count of registered sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Get the count of joined players
    pub fn player_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_joined()).count()
    }

    /// Get list of all session IDs
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|r| *r.key()).collect()
    }

    /// Cancel every session. Each one deregisters itself as it terminates.
    pub fn disconnect_all(&self) {
        for session in self.sessions.iter() {
            session.close();
        }
        info!(sessions = self.sessions.len(), "Disconnecting all sessions");
    }

    /// Process JOIN_GAME.
    ///
    /// Returns false if the session had already joined; a repeated join is
    /// ignored.
    pub fn on_join(&self, session: &Arc<Session>, name: String) -> bool {
        if session.is_joined() {
            warn!(session_id = session.id, "Repeated JOIN_GAME ignored");
            return false;
        }

        let _membership = self.membership.write();

        let player = Player::joined(session.id, name);
        session.set_player(player.clone());

        info!(
            session_id = session.id,
            player_id = player.id,
            name = %player.name,
            "Player joined"
        );

        self.send_to(
            session,
            &ServerMessage::LoginResult {
                player_id: player.id,
                position: player.position,
            },
        );

        let others = self.joined_sessions(Some(session.id));

        // Existing players to the joiner first...
        for other in &others {
            if let Some(existing) = other.player() {
                self.send_to(
                    session,
                    &ServerMessage::SpawnPlayer {
                        player_id: existing.id,
                        position: existing.position,
                    },
                );
            }
        }

        // ...then the joiner to everyone else
        if let Some(frame) = Self::encode(&ServerMessage::SpawnPlayer {
            player_id: player.id,
            position: player.position,
        }) {
            for other in &others {
                self.deliver(other, frame.clone());
            }
        }

        true
    }

    /// Process a client MOVE. Returns the number of recipients.
    pub fn on_move(&self, session: &Arc<Session>, position: Position) -> usize {
        let _membership = self.membership.read();

        let player = match session.move_player(position) {
            Some(player) if player.in_game => player,
            _ => {
                debug!(session_id = session.id, "MOVE before join ignored");
                return 0;
            }
        };

        trace!(
            session_id = session.id,
            position = %player.position,
            "Player moved"
        );

        self.broadcast(
            &ServerMessage::Move {
                player_id: player.id,
                position: player.position,
            },
            Some(session.id),
        )
    }

    /// Process a client CHAT. Returns the number of recipients.
    pub fn on_chat(&self, session: &Arc<Session>, text: String) -> usize {
        if !session.is_joined() {
            debug!(session_id = session.id, "CHAT before join ignored");
            return 0;
        }

        let _membership = self.membership.read();

        debug!(session_id = session.id, len = text.len(), "Chat message");

        self.broadcast(
            &ServerMessage::Chat {
                player_id: session.id,
                text,
            },
            Some(session.id),
        )
    }

    /// Process LEAVE_GAME: the session is removed and despawned now.
    pub fn on_leave(&self, session_id: SessionId) -> bool {
        info!(session_id = session_id, "Player left");
        self.on_disconnect(session_id)
    }

    /// Remove a session and, if it had joined, broadcast its despawn.
    ///
    /// Safe to call from every termination path; only the first call for a
    /// given session has any effect. Returns whether this call removed it.
    pub fn on_disconnect(&self, session_id: SessionId) -> bool {
        let _membership = self.membership.write();

        let session = match self.sessions.remove(&session_id) {
            Some((_, session)) => session,
            None => return false,
        };

        let was_joined = session.is_joined();
        session.set_state(SessionState::Closed);

        if was_joined {
            let recipients = self.broadcast(
                &ServerMessage::DespawnPlayer {
                    player_id: session_id,
                },
                Some(session_id),
            );
            debug!(
                session_id = session_id,
                recipients = recipients,
                "Despawn broadcast"
            );
        }

        info!(
            session_id = session_id,
            address = %session.address,
            joined = was_joined,
            "Session removed"
        );
        true
    }

    /// Send one message to every joined session except `exclude`.
    ///
    /// The message is encoded once. Returns how many queues accepted it.
    pub fn broadcast(&self, message: &ServerMessage, exclude: Option<SessionId>) -> usize {
        let frame = match Self::encode(message) {
            Some(frame) => frame,
            None => return 0,
        };

        self.joined_sessions(exclude)
            .iter()
            .filter(|session| self.deliver(session, frame.clone()))
            .count()
    }

    /// Send one message to one session
    pub fn send_to(&self, session: &Session, message: &ServerMessage) -> bool {
        match Self::encode(message) {
            Some(frame) => self.deliver(session, frame),
            None => false,
        }
    }

    /// Snapshot of joined sessions, taken so no map guard is held while sending
    fn joined_sessions(&self, exclude: Option<SessionId>) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .filter(|s| Some(s.id) != exclude && s.is_joined())
            .map(|s| s.value().clone())
            .collect()
    }

    fn encode(message: &ServerMessage) -> Option<Bytes> {
        match message.to_frame() {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(kind = %message.kind(), error = %e, "Failed to encode message");
                None
            }
        }
    }

    /// Enqueue a frame; evict the recipient if its queue is full
    fn deliver(&self, session: &Session, frame: Bytes) -> bool {
        match session.try_send(frame) {
            Ok(()) => true,
            Err(RelayError::Network(NetworkError::SendQueueFull(id))) => {
                warn!(session_id = id, "Outbound queue full, evicting session");
                session.close();
                false
            }
            Err(e) => {
                debug!(session_id = session.id, error = %e, "Dropped frame for closing session");
                false
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
