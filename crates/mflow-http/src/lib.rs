//! The HTTP+JSON management API: one `axum::Router` per node instance,
//! exposing lifecycle, parameters, statistics, and logging-level control
//! over the shared `NodeControl` contract.

mod envelope;
mod logging;
mod router;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use mflow_core::NodeError;
use mflow_node::NodeControl;
use tokio::sync::Notify;

pub use envelope::{Envelope, HttpError};
pub use logging::LoggingRegistry;
pub use router::build_router;

/// Shared `axum` state: the control handle for this instance, its logging
/// registry, and a shutdown notifier the `kill` endpoint can trigger.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<dyn NodeControl>,
    pub logging: LoggingRegistry,
    pub shutdown: Arc<Notify>,
}

/// Binds `addr` and serves `router` until either an OS shutdown signal
/// arrives or the `kill` endpoint notifies `shutdown`. Best-effort stops
/// `manager` before returning, matching the "ensure `stop()` is attempted on
/// server shutdown" contract.
pub async fn serve(
    router: axum::Router,
    addr: SocketAddr,
    manager: Arc<dyn NodeControl>,
    shutdown: Arc<Notify>,
) -> Result<(), NodeError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NodeError::IoError { detail: format!("binding {addr}: {e}") })?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.notified() => {}
                _ = shutdown_signal() => {}
            }
        })
        .await
        .map_err(|e| NodeError::IoError { detail: format!("http server failed: {e}") })?;

    let _ = manager.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
