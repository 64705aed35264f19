use clap::Parser;
use futures::StreamExt;
use ingrate::args::IngrateArgs;
use ingrate::controller::{reconcile, requeue_delay, Context, ReconcileError};
use ingrate::server::{run_health_server, ReadinessState};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{info, warn};

/// Default port for health endpoints
const HEALTH_PORT: u16 = 8080;

/// Error policy for the controller
///
/// Reconciliation errors are expected (apply conflicts, transient API
/// failures) and requeue the full cycle, so `warn!` rather than `error!`.
pub fn error_policy(_ingress: Arc<Ingress>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    warn!("Reconcile error (will retry): {:?}", error);
    Action::requeue(requeue_delay(error))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = IngrateArgs::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .init();

    info!(
        namespace = %args.namespace,
        instance = %args.instance,
        "Starting ingrate controller"
    );

    // Create readiness state (initially not ready)
    let readiness = ReadinessState::new();

    // Start health server in background
    let health_readiness = readiness.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(HEALTH_PORT, health_readiness).await {
            warn!(error = %e, "Health server failed");
        }
    });

    // An unreachable control plane is fatal at startup: exit non-zero and
    // let the restart policy retry. Steady-state watch errors are retried
    // with backoff by the controller runtime instead.
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("cannot reach the control plane: {e}"))?;
    client
        .apiserver_version()
        .await
        .map_err(|e| anyhow::anyhow!("cannot reach the control plane: {e}"))?;

    info!("Connected to Kubernetes cluster");

    let ctx = Arc::new(Context::new(
        client.clone(),
        args.namespace.clone(),
        args.instance.clone(),
        args.selector().map(str::to_string),
    ));

    // Watch ingresses everywhere; a reconcile pass re-reads everything it
    // needs, so the watch only has to say that something changed.
    let ingresses = Api::<Ingress>::all(client);
    let mut watch_config = watcher::Config::default();
    if let Some(selector) = args.selector() {
        watch_config = watch_config.labels(selector);
    }

    // Mark as ready - controller is initialized and about to start
    readiness.set_ready();
    info!("Controller ready, starting reconciliation loop");

    Controller::new(ingresses, watch_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Ok(o) = res {
                info!("Reconciled: {:?}", o);
            }
            // Errors are logged in error_policy, no duplicate logging
        })
        .await;

    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
