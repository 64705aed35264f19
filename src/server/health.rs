//! Health check endpoints for Kubernetes probes
//!
//! - `/healthz` - Liveness: is the controller process alive?
//! - `/readyz` - Readiness: has the controller reached the control plane?
//!
//! These report on the controller pod itself. The proxy pods it manages are
//! probed separately, with a bare TCP accept on their data port.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared readiness flag, flipped once the control plane is reachable and
/// the reconciliation loop is about to start.
#[derive(Debug, Clone, Default)]
pub struct ReadinessState {
    ready: Arc<AtomicBool>,
}

impl ReadinessState {
    /// New state, initially not ready.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Liveness: if this answers at all, the process is alive.
async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Readiness: 200 once reconciling, 503 before that.
async fn readyz(State(readiness): State<ReadinessState>) -> StatusCode {
    if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn router(readiness: ReadinessState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(readiness)
}

/// Serve the probe endpoints until shutdown.
pub async fn run_health_server(port: u16, readiness: ReadinessState) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    // Log after the bind succeeds; before that nothing is listening.
    info!(port = %port, "Health server listening");

    axum::serve(listener, router(readiness))
        .await
        .map_err(std::io::Error::other)
}

#[cfg(test)]
#[path = "health_test.rs"]
mod tests;
