//! Listener module
//!
//! Accepts TCP connections and runs one session task per connection. The
//! session tasks live in a `JoinSet` owned by the accept loop, so shutdown
//! cancels and joins every one of them before returning.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::net::handler::ConnectionHandler;
use crate::AppState;

/// How long shutdown waits for sessions to finish before aborting them
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept connections until a shutdown signal arrives, then stop every
/// session and wait for them to terminate.
pub async fn accept_connections(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        info!(address = %addr, "New connection");
                        let handler = ConnectionHandler::new(state.clone());
                        sessions.spawn(async move {
                            if let Err(e) = handler.handle_tcp(stream, addr).await {
                                warn!(address = %addr, error = %e, "Connection error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "Session task failed");
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Connection acceptor shutting down");
                break;
            }
        }
    }

    drain_sessions(&state, sessions).await;
}

/// Cancel every session and join its task
async fn drain_sessions(state: &AppState, mut sessions: JoinSet<()>) {
    let count = sessions.len();
    state.registry.disconnect_all();

    let drain = async {
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Session task failed during shutdown");
            }
        }
    };

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Sessions did not stop in time, aborting"
        );
        sessions.abort_all();
    }

    debug!(sessions = count, "All session tasks finished");
}
