//! Relay Server
//!
//! Real-time multiplayer relay: clients join under a display name and the
//! server fans out spawns, moves, chat and despawns to everyone else in game.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use relay_server::config::ServerConfig;
use relay_server::game::{DueEvent, WorldEvents};
use relay_server::net::listener::accept_connections;
use relay_server::state::AppState;
use relay_server::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so `debug` can shape the log filter
    let config = ServerConfig::load().await?;

    init_logging(config.debug);

    info!("╔══════════════════════════════════════════════╗");
    info!("║            Relay Server v{}                 ║", VERSION);
    info!("╚══════════════════════════════════════════════╝");
    if config.file_exists() {
        info!(
            "Configuration loaded from: {}",
            config.config_path.display()
        );
    } else {
        warn!(
            "Config file not found at {}, using defaults",
            config.config_path.display()
        );
    }

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let state = Arc::new(AppState::new(config.clone(), shutdown_tx.clone()));
    info!("Application state initialized");

    // Start the world event driver
    let (world_events, events_rx) =
        WorldEvents::new(state.scheduler.clone(), config.scheduler_poll_interval());
    let mut world_shutdown_rx = shutdown_tx.subscribe();
    let world_handle = tokio::spawn(async move {
        world_events.run(&mut world_shutdown_rx).await;
    });
    let events_handle = tokio::spawn(consume_world_events(events_rx));

    // Start TCP listener
    let listen_addr = config.listen_addr()?;
    let listener = TcpListener::bind(listen_addr).await?;
    info!("Relay listening on: {}", listener.local_addr()?);

    let accept_state = state.clone();
    let mut accept_shutdown_rx = shutdown_tx.subscribe();
    let accept_handle = tokio::spawn(async move {
        accept_connections(listener, accept_state, &mut accept_shutdown_rx).await;
    });

    info!("Server startup complete!");
    info!("{} is ready for connections", config.server_name);

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await?;

    info!("Shutting down server...");

    if let Err(e) = accept_handle.await {
        warn!(error = %e, "Connection acceptor task failed");
    }
    info!(remaining = state.registry.count(), "All sessions disconnected");

    if let Err(e) = world_handle.await {
        warn!(error = %e, "World event driver task failed");
    }
    if let Err(e) = events_handle.await {
        warn!(error = %e, "World event consumer task failed");
    }

    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging(debug: bool) {
    let default_filter = if debug {
        "debug,relay_server=trace"
    } else {
        "info,relay_server=debug"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();
}

/// Log due world events. Game content that reacts to them plugs in here.
async fn consume_world_events(mut events_rx: mpsc::UnboundedReceiver<DueEvent>) {
    while let Some(event) = events_rx.recv().await {
        info!(
            event_target = ?event.target,
            kind = ?event.kind,
            late_secs = event.lateness_secs(),
            "World event due"
        );
    }
    debug!("World event channel closed");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
    Ok(())
}
