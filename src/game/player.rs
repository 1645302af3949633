//! Player module
//!
//! The authoritative state of one joined participant: display name,
//! position and the in-game flag. A `Player` is owned by its session and
//! only mutated by that session's task.

use crate::protocol::message::{PlayerId, Position};

/// A joined participant
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Player id (equal to the owning session's id)
    pub id: PlayerId,
    /// Display name as sent by the client, unvalidated
    pub name: String,
    /// Last reported position
    pub position: Position,
    /// Whether the join handshake has completed
    pub in_game: bool,
}

impl Player {
    /// Create a player that has not joined yet
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: Position::ORIGIN,
            in_game: false,
        }
    }

    /// Create a player that has just joined at the spawn origin
    pub fn joined(id: PlayerId, name: impl Into<String>) -> Self {
        let mut player = Self::new(id, name);
        player.join();
        player
    }

    /// Enter the game at the spawn origin
    pub fn join(&mut self) {
        self.in_game = true;
        self.position = Position::ORIGIN;
    }

    /// Record a new position. Last write wins.
    pub fn move_to(&mut self, position: Position) {
        self.position = position;
    }

    pub fn is_in_game(&self) -> bool {
        self.in_game
    }
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (#{}) at {}", self.name, self.id, self.position)
    }
}
