//! Relay Server Library
//!
//! This library provides the core functionality for the real-time multiplayer
//! relay server: a compact binary protocol, per-connection sessions, the
//! authoritative player registry with its broadcast rules, and a due-time
//! scheduler for deferred world events.
//!
//! ## Modules
//!
//! - `client` - Conforming protocol client (tests and the probe binary)
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `game` - Players, registry, scheduler and event driver
//! - `net` - Network handling and session management
//! - `protocol` - Frame codec and message catalog

pub mod client;
pub mod config;
pub mod error;
pub mod game;
pub mod net;
pub mod protocol;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{RelayError, Result};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default TCP port for client connections
pub const DEFAULT_PORT: u16 = 7777;
