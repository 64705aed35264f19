//! HTTP server for the controller's own health probes
//!
//! - `/healthz` - Liveness probe (process is running)
//! - `/readyz` - Readiness probe (controller reached the control plane)

mod health;

pub use health::{run_health_server, ReadinessState};
