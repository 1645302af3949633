//! Game module
//!
//! Authoritative game state for the relay:
//! - Players and their positions
//! - Session registry and broadcast rules
//! - Deferred world events (scheduler and its driver)

pub mod player;
pub mod registry;
pub mod scheduler;
pub mod world;

pub use player::Player;
pub use registry::SessionRegistry;
pub use scheduler::{EventKind, EventScheduler, EventTarget};
pub use world::{DueEvent, WorldEvents};
