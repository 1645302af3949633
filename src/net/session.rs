//! Session module
//!
//! One `Session` per accepted connection:
//! - Session state machine (connecting -> reading -> joined -> closed)
//! - The owned `Player`, absent until the session joins
//! - Bounded outbound frame queue drained by the connection's writer task
//! - Cancellation token used for eviction and shutdown

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{NetworkError, RelayError, Result};
use crate::game::player::Player;
use crate::protocol::message::Position;

/// Unique session identifier, shared with the player id space
pub type SessionId = i32;

/// Session state in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Accepted, not yet reading
    Connecting,
    /// Read loop running, not joined
    Reading,
    /// JOIN_GAME processed; visible to broadcasts
    Joined,
    /// Terminated
    Closed,
}

impl SessionState {
    /// Check if the session is still active
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Closed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Connecting => "Connecting",
            SessionState::Reading => "Reading",
            SessionState::Joined => "Joined",
            SessionState::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A connected client session
pub struct Session {
    /// Unique session identifier
    pub id: SessionId,
    /// Remote address of the client
    pub address: SocketAddr,
    /// Current session state
    state: RwLock<SessionState>,
    /// Player owned by this session (set on join)
    player: RwLock<Option<Player>>,
    /// Time of session creation
    pub created_at: Instant,
    /// Time of last inbound frame
    last_activity: RwLock<Instant>,
    /// Outbound frame queue
    outbound_tx: mpsc::Sender<Bytes>,
    /// Fires when the session must stop (eviction, shutdown)
    cancel: CancellationToken,
}

impl Session {
    /// Create a new session around its outbound queue
    pub fn new(id: SessionId, address: SocketAddr, outbound_tx: mpsc::Sender<Bytes>) -> Self {
        let now = Instant::now();
        Self {
            id,
            address,
            state: RwLock::new(SessionState::Connecting),
            player: RwLock::new(None),
            created_at: now,
            last_activity: RwLock::new(now),
            outbound_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Set the session state
    pub fn set_state(&self, new_state: SessionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };
        debug!(
            session_id = self.id,
            old_state = %old_state,
            new_state = %new_state,
            "Session state changed"
        );
    }

    /// Check if session is active
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Whether this session's player has joined the game
    pub fn is_joined(&self) -> bool {
        self.player
            .read()
            .as_ref()
            .map(Player::is_in_game)
            .unwrap_or(false)
    }

    /// Snapshot of the owned player
    pub fn player(&self) -> Option<Player> {
        self.player.read().clone()
    }

    /// Install the joined player and move to `Joined`
    pub fn set_player(&self, player: Player) {
        *self.player.write() = Some(player);
        self.set_state(SessionState::Joined);
    }

    /// Update the player's position, returning the stored player.
    ///
    /// `None` if the session has not joined.
    pub fn move_player(&self, position: Position) -> Option<Player> {
        let mut guard = self.player.write();
        let player = guard.as_mut()?;
        player.move_to(position);
        Some(player.clone())
    }

    /// Update the last activity timestamp
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Get the last activity time
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.read()
    }

    /// Get the duration since last activity
    pub fn idle_duration(&self) -> Duration {
        self.last_activity().elapsed()
    }

    /// Queue an encoded frame without waiting
    pub fn try_send(&self, data: Bytes) -> Result<()> {
        self.outbound_tx.try_send(data).map_err(|e| match e {
            TrySendError::Full(_) => RelayError::Network(NetworkError::SendQueueFull(self.id)),
            TrySendError::Closed(_) => RelayError::Network(NetworkError::ConnectionClosed),
        })
    }

    /// Token that fires when this session must stop
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Ask the session's tasks to stop
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state())
            .field("player", &self.player())
            .field("created_at", &self.created_at)
            .field("idle_duration", &self.idle_duration())
            .finish()
    }
}
