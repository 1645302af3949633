//! Networking module
//!
//! This module handles all network-related functionality for the relay:
//! - TCP accept loop and session task supervision
//! - Frame reading and outbound writing
//! - Session state
//! - Connection lifecycle

pub mod buffer;
pub mod handler;
pub mod listener;
pub mod session;
pub mod transport;
