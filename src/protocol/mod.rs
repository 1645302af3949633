//! Protocol module
//!
//! Wire protocol for the relay:
//! - Frame codec (length-delimited frames)
//! - Message catalog (per-kind body layouts, split by direction)

pub mod frame;
pub mod message;

pub use frame::{Frame, HEADER_SIZE, MAX_FRAME_SIZE};
pub use message::{ClientMessage, MessageKind, PlayerId, Position, ServerMessage};
