//! Application state module
//!
//! Contains the shared state used across all server connections.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::ServerConfig;
use crate::game::registry::SessionRegistry;
use crate::game::scheduler::EventScheduler;

/// Application state shared across all connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Registry of live sessions and their players
    pub registry: SessionRegistry,
    /// Deferred world events
    pub scheduler: Arc<EventScheduler>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: ServerConfig, shutdown_tx: broadcast::Sender<()>) -> Self {
        info!(
            outbound_queue_capacity = config.outbound_queue_capacity,
            "Creating session registry"
        );

        Self {
            registry: SessionRegistry::with_capacity(config.outbound_queue_capacity),
            scheduler: Arc::new(EventScheduler::new()),
            config,
            shutdown_tx,
        }
    }

    /// Subscribe to the shutdown signal
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal every subscriber to shut down
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
