//! Message catalog
//!
//! The closed set of messages the relay understands, split by direction.
//! `ClientMessage` is what the server decodes; `ServerMessage` is what it
//! encodes (and what a conforming client decodes).
//!
//! String fields follow two conventions depending on kind, and both are kept
//! as-is for wire compatibility:
//! - LOGIN and JOIN_GAME carry raw UTF-8 running to the end of the frame.
//! - CHAT (both directions) carries a 2-byte little-endian length prefix.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::net::buffer::PacketBuffer;
use crate::protocol::frame::{self, Frame};

/// Wire identifier of a player (same value space as session ids)
pub type PlayerId = i32;

/// Message kind byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Legacy text login (client to server)
    Login = 1,
    /// Login result: assigned id and spawn position
    LoginResult = 2,
    /// Position update from a client
    ClientMove = 3,
    /// Position update relayed to other clients
    ServerMove = 4,
    /// Chat line from a client
    ClientChat = 5,
    /// Chat line relayed to other clients
    ServerChat = 6,
    /// Join the game under a display name
    JoinGame = 7,
    /// Leave the game
    LeaveGame = 8,
    /// A player appeared
    SpawnPlayer = 9,
    /// A player went away
    DespawnPlayer = 10,
}

impl MessageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Login),
            2 => Some(Self::LoginResult),
            3 => Some(Self::ClientMove),
            4 => Some(Self::ServerMove),
            5 => Some(Self::ClientChat),
            6 => Some(Self::ServerChat),
            7 => Some(Self::JoinGame),
            8 => Some(Self::LeaveGame),
            9 => Some(Self::SpawnPlayer),
            10 => Some(Self::DespawnPlayer),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Protocol name used in logs
    pub fn name(self) -> &'static str {
        match self {
            Self::Login => "CS_LOGIN",
            Self::LoginResult => "SC_LOGIN_RESULT",
            Self::ClientMove => "CS_MOVE",
            Self::ServerMove => "SC_MOVE",
            Self::ClientChat => "CS_CHAT",
            Self::ServerChat => "SC_CHAT",
            Self::JoinGame => "CS_JOIN_GAME",
            Self::LeaveGame => "CS_LEAVE_GAME",
            Self::SpawnPlayer => "SC_SPAWN_PLAYER",
            Self::DespawnPlayer => "SC_DESPAWN_PLAYER",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A point in the world, three little-endian 32-bit floats on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    /// Fixed spawn origin for every joining player
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    fn read(buf: &mut PacketBuffer, context: &'static str) -> Result<Self, ProtocolError> {
        buf.ensure_remaining(context, 12)?;
        Ok(Self {
            x: buf.read_f32_le(context)?,
            y: buf.read_f32_le(context)?,
            z: buf.read_f32_le(context)?,
        })
    }

    fn write(&self, buf: &mut PacketBuffer) {
        buf.write_f32_le(self.x);
        buf.write_f32_le(self.y);
        buf.write_f32_le(self.z);
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Reads a player id followed by a position (LOGIN_RESULT, SC_MOVE, SPAWN)
fn read_id_position(
    buf: &mut PacketBuffer,
    context: &'static str,
) -> Result<(PlayerId, Position), ProtocolError> {
    buf.ensure_remaining(context, 16)?;
    let player_id = buf.read_i32_le(context)?;
    let position = Position::read(buf, context)?;
    Ok((player_id, position))
}

/// Messages sent by clients
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Legacy text login
    Login { text: String },
    /// Join the game under a display name
    JoinGame { name: String },
    /// Leave the game; the session ends after this
    LeaveGame,
    /// New position for the sender's player
    Move { position: Position },
    /// Chat line from the sender
    Chat { text: String },
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Login { .. } => MessageKind::Login,
            Self::JoinGame { .. } => MessageKind::JoinGame,
            Self::LeaveGame => MessageKind::LeaveGame,
            Self::Move { .. } => MessageKind::ClientMove,
            Self::Chat { .. } => MessageKind::ClientChat,
        }
    }

    /// Decode a frame received from a client.
    ///
    /// Server-originated kinds are not part of this direction's catalog and
    /// decode as `UnknownMessage`.
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let kind = MessageKind::from_u8(frame.kind)
            .ok_or(ProtocolError::UnknownMessage(frame.kind))?;
        Self::decode_body(kind, &frame.body)
    }

    pub fn decode_body(kind: MessageKind, body: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = PacketBuffer::from_bytes(body);
        match kind {
            MessageKind::Login => Ok(Self::Login {
                text: buf.read_str_to_end(),
            }),
            MessageKind::JoinGame => Ok(Self::JoinGame {
                name: buf.read_str_to_end(),
            }),
            MessageKind::LeaveGame => Ok(Self::LeaveGame),
            MessageKind::ClientMove => Ok(Self::Move {
                position: Position::read(&mut buf, "CS_MOVE")?,
            }),
            MessageKind::ClientChat => Ok(Self::Chat {
                text: buf.read_str_prefixed("CS_CHAT")?,
            }),
            MessageKind::LoginResult
            | MessageKind::ServerMove
            | MessageKind::ServerChat
            | MessageKind::SpawnPlayer
            | MessageKind::DespawnPlayer => Err(ProtocolError::UnknownMessage(kind.as_u8())),
        }
    }

    pub fn encode_body(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = PacketBuffer::new();
        match self {
            Self::Login { text } => buf.write_str_raw(text),
            Self::JoinGame { name } => buf.write_str_raw(name),
            Self::LeaveGame => {}
            Self::Move { position } => position.write(&mut buf),
            Self::Chat { text } => buf.write_str_prefixed(text)?,
        }
        Ok(buf.freeze())
    }

    /// Encode as a complete wire frame
    pub fn to_frame(&self) -> Result<Bytes, ProtocolError> {
        frame::encode(self.kind().as_u8(), &self.encode_body()?)
    }
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Reply to JOIN_GAME: the joiner's id and spawn position
    LoginResult {
        player_id: PlayerId,
        position: Position,
    },
    /// Another player moved
    Move {
        player_id: PlayerId,
        position: Position,
    },
    /// A player is now in the game
    SpawnPlayer {
        player_id: PlayerId,
        position: Position,
    },
    /// A player left the game
    DespawnPlayer { player_id: PlayerId },
    /// Chat line from another player
    Chat { player_id: PlayerId, text: String },
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::LoginResult { .. } => MessageKind::LoginResult,
            Self::Move { .. } => MessageKind::ServerMove,
            Self::SpawnPlayer { .. } => MessageKind::SpawnPlayer,
            Self::DespawnPlayer { .. } => MessageKind::DespawnPlayer,
            Self::Chat { .. } => MessageKind::ServerChat,
        }
    }

    /// Decode a frame received from the server
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let kind = MessageKind::from_u8(frame.kind)
            .ok_or(ProtocolError::UnknownMessage(frame.kind))?;
        Self::decode_body(kind, &frame.body)
    }

    pub fn decode_body(kind: MessageKind, body: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = PacketBuffer::from_bytes(body);
        match kind {
            MessageKind::LoginResult => {
                let (player_id, position) = read_id_position(&mut buf, "SC_LOGIN_RESULT")?;
                Ok(Self::LoginResult {
                    player_id,
                    position,
                })
            }
            MessageKind::ServerMove => {
                let (player_id, position) = read_id_position(&mut buf, "SC_MOVE")?;
                Ok(Self::Move {
                    player_id,
                    position,
                })
            }
            MessageKind::SpawnPlayer => {
                let (player_id, position) = read_id_position(&mut buf, "SC_SPAWN_PLAYER")?;
                Ok(Self::SpawnPlayer {
                    player_id,
                    position,
                })
            }
            MessageKind::DespawnPlayer => Ok(Self::DespawnPlayer {
                player_id: buf.read_i32_le("SC_DESPAWN_PLAYER")?,
            }),
            MessageKind::ServerChat => {
                // id plus at least the string's length prefix
                buf.ensure_remaining("SC_CHAT", 6)?;
                let player_id = buf.read_i32_le("SC_CHAT")?;
                let text = buf.read_str_prefixed("SC_CHAT")?;
                Ok(Self::Chat { player_id, text })
            }
            MessageKind::Login
            | MessageKind::JoinGame
            | MessageKind::LeaveGame
            | MessageKind::ClientMove
            | MessageKind::ClientChat => Err(ProtocolError::UnknownMessage(kind.as_u8())),
        }
    }

    pub fn encode_body(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = PacketBuffer::with_capacity(16);
        match self {
            Self::LoginResult {
                player_id,
                position,
            }
            | Self::Move {
                player_id,
                position,
            }
            | Self::SpawnPlayer {
                player_id,
                position,
            } => {
                buf.write_i32_le(*player_id);
                position.write(&mut buf);
            }
            Self::DespawnPlayer { player_id } => buf.write_i32_le(*player_id),
            Self::Chat { player_id, text } => {
                buf.write_i32_le(*player_id);
                buf.write_str_prefixed(text)?;
            }
        }
        Ok(buf.freeze())
    }

    /// Encode as a complete wire frame
    pub fn to_frame(&self) -> Result<Bytes, ProtocolError> {
        frame::encode(self.kind().as_u8(), &self.encode_body()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::buffer::MAX_STRING_LEN;
    use pretty_assertions::assert_eq;

    fn client_round_trip(msg: ClientMessage) {
        let bytes = msg.to_frame().unwrap();
        let (frame, used) = frame::decode(&bytes).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(ClientMessage::decode(&frame).unwrap(), msg);
    }

    fn server_round_trip(msg: ServerMessage) {
        let bytes = msg.to_frame().unwrap();
        let (frame, _) = frame::decode(&bytes).unwrap().unwrap();
        assert_eq!(ServerMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_kind_values() {
        assert_eq!(MessageKind::Login.as_u8(), 1);
        assert_eq!(MessageKind::LoginResult.as_u8(), 2);
        assert_eq!(MessageKind::ClientChat.as_u8(), 5);
        assert_eq!(MessageKind::JoinGame.as_u8(), 7);
        assert_eq!(MessageKind::DespawnPlayer.as_u8(), 10);
        for value in 1..=10u8 {
            assert_eq!(MessageKind::from_u8(value).unwrap().as_u8(), value);
        }
        assert_eq!(MessageKind::from_u8(0), None);
        assert_eq!(MessageKind::from_u8(11), None);
        assert_eq!(MessageKind::SpawnPlayer.to_string(), "SC_SPAWN_PLAYER");
    }

    #[test]
    fn test_client_messages_round_trip() {
        client_round_trip(ClientMessage::Login {
            text: "legacy".to_string(),
        });
        client_round_trip(ClientMessage::JoinGame {
            name: "Alice".to_string(),
        });
        client_round_trip(ClientMessage::JoinGame {
            name: String::new(),
        });
        client_round_trip(ClientMessage::LeaveGame);
        client_round_trip(ClientMessage::Move {
            position: Position::new(1.0, -0.5, 2.25),
        });
        client_round_trip(ClientMessage::Chat {
            text: "안녕하세요".to_string(),
        });
        client_round_trip(ClientMessage::Chat {
            text: String::new(),
        });
    }

    #[test]
    fn test_server_messages_round_trip() {
        server_round_trip(ServerMessage::LoginResult {
            player_id: 1,
            position: Position::ORIGIN,
        });
        server_round_trip(ServerMessage::Move {
            player_id: i32::MAX,
            position: Position::new(f32::MAX, f32::MIN, 0.125),
        });
        server_round_trip(ServerMessage::SpawnPlayer {
            player_id: 7,
            position: Position::new(3.0, 4.0, 5.0),
        });
        server_round_trip(ServerMessage::DespawnPlayer { player_id: -1 });
        server_round_trip(ServerMessage::Chat {
            player_id: 2,
            text: "hi there".to_string(),
        });
        server_round_trip(ServerMessage::Chat {
            player_id: 2,
            text: String::new(),
        });
    }

    #[test]
    fn test_max_length_chat_body_round_trip() {
        let text = "a".repeat(MAX_STRING_LEN);

        let msg = ClientMessage::Chat { text: text.clone() };
        let body = msg.encode_body().unwrap();
        assert_eq!(body.len(), 2 + MAX_STRING_LEN);
        assert_eq!(
            ClientMessage::decode_body(MessageKind::ClientChat, &body).unwrap(),
            msg
        );

        let msg = ServerMessage::Chat { player_id: 3, text };
        let body = msg.encode_body().unwrap();
        assert_eq!(
            ServerMessage::decode_body(MessageKind::ServerChat, &body).unwrap(),
            msg
        );

        // Neither body fits inside a 16-bit frame
        assert!(matches!(
            msg.to_frame(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_chat_longer_than_prefix_rejected() {
        let msg = ClientMessage::Chat {
            text: "a".repeat(MAX_STRING_LEN + 1),
        };
        assert!(matches!(
            msg.encode_body(),
            Err(ProtocolError::StringTooLong { .. })
        ));
    }

    #[test]
    fn test_leave_accepts_empty_body() {
        let frame = Frame::new(MessageKind::LeaveGame.as_u8(), Bytes::new());
        assert_eq!(ClientMessage::decode(&frame).unwrap(), ClientMessage::LeaveGame);
    }

    #[test]
    fn test_move_rejects_empty_body() {
        let frame = Frame::new(MessageKind::ClientMove.as_u8(), Bytes::new());
        assert_eq!(
            ClientMessage::decode(&frame),
            Err(ProtocolError::InsufficientData {
                context: "CS_MOVE",
                expected: 12,
                actual: 0,
            })
        );
    }

    #[test]
    fn test_truncated_fixed_bodies_rejected() {
        let body = [0u8; 15];
        for kind in [
            MessageKind::LoginResult,
            MessageKind::ServerMove,
            MessageKind::SpawnPlayer,
        ] {
            assert!(matches!(
                ServerMessage::decode_body(kind, &body),
                Err(ProtocolError::InsufficientData {
                    expected: 16,
                    actual: 15,
                    ..
                })
            ));
        }
        assert!(ServerMessage::decode_body(MessageKind::DespawnPlayer, &[1, 0, 0]).is_err());
        assert!(ServerMessage::decode_body(MessageKind::ServerChat, &[1, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_invalid_utf8_text_is_replaced() {
        let frame = Frame::new(MessageKind::JoinGame.as_u8(), vec![b'A', 0xff]);
        assert_eq!(
            ClientMessage::decode(&frame).unwrap(),
            ClientMessage::JoinGame {
                name: "A\u{FFFD}".to_string()
            }
        );

        let frame = Frame::new(MessageKind::Login.as_u8(), vec![0xc3]);
        assert_eq!(
            ClientMessage::decode(&frame).unwrap(),
            ClientMessage::Login {
                text: "\u{FFFD}".to_string()
            }
        );

        let frame = Frame::new(MessageKind::ClientChat.as_u8(), vec![2, 0, 0xfe, b'!']);
        assert_eq!(
            ClientMessage::decode(&frame).unwrap(),
            ClientMessage::Chat {
                text: "\u{FFFD}!".to_string()
            }
        );

        let body = [7, 0, 0, 0, 1, 0, 0xff];
        assert_eq!(
            ServerMessage::decode_body(MessageKind::ServerChat, &body).unwrap(),
            ServerMessage::Chat {
                player_id: 7,
                text: "\u{FFFD}".to_string()
            }
        );
    }

    #[test]
    fn test_chat_prefix_overrun_rejected() {
        // Declares 5 bytes of text, carries 2
        let body = [5, 0, b'h', b'i'];
        assert!(matches!(
            ClientMessage::decode_body(MessageKind::ClientChat, &body),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_unknown_kinds_rejected() {
        let frame = Frame::new(99, Bytes::new());
        assert_eq!(
            ClientMessage::decode(&frame),
            Err(ProtocolError::UnknownMessage(99))
        );
        assert_eq!(
            ServerMessage::decode(&frame),
            Err(ProtocolError::UnknownMessage(99))
        );

        // Each direction rejects the other's kinds
        let frame = Frame::new(MessageKind::SpawnPlayer.as_u8(), vec![0u8; 16]);
        assert_eq!(
            ClientMessage::decode(&frame),
            Err(ProtocolError::UnknownMessage(9))
        );
        let frame = Frame::new(MessageKind::JoinGame.as_u8(), b"Bob".to_vec());
        assert_eq!(
            ServerMessage::decode(&frame),
            Err(ProtocolError::UnknownMessage(7))
        );
    }

    #[test]
    fn test_wire_layout_matches_reference() {
        let bytes = ServerMessage::Move {
            player_id: 1,
            position: Position::new(1.0, 0.0, 2.0),
        }
        .to_frame()
        .unwrap();

        let mut expected = vec![19, 0, 4, 1, 0, 0, 0];
        expected.extend_from_slice(&1.0f32.to_le_bytes());
        expected.extend_from_slice(&0.0f32.to_le_bytes());
        expected.extend_from_slice(&2.0f32.to_le_bytes());
        assert_eq!(bytes.to_vec(), expected);

        let bytes = ClientMessage::JoinGame {
            name: "Alice".to_string(),
        }
        .to_frame()
        .unwrap();
        assert_eq!(bytes.to_vec(), b"\x08\x00\x07Alice".to_vec());

        let bytes = ClientMessage::Chat {
            text: "yo".to_string(),
        }
        .to_frame()
        .unwrap();
        assert_eq!(bytes.to_vec(), vec![7, 0, 5, 2, 0, b'y', b'o']);
    }
}
