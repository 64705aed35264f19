//! Reconciliation loop: snapshot → synthesize → compare → apply.
//!
//! One `kube::runtime::Controller` watches Ingresses; any change (or the
//! periodic resync) triggers a full pass. The pass gathers a fresh immutable
//! snapshot, runs the pure planners, and hands the results to the apply
//! layer. Conflicting writes retry the entire cycle, never a partial merge.

pub mod apply;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::ListParams;
use kube::runtime::controller::Action;
use kube::{Api, Client};
use thiserror::Error;
use tracing::{info, warn};

use crate::consts::{
    DEFAULT_EXTRACT_IMAGE, DEFAULT_PROXY_IMAGE, EXTRACT_IMAGE_ENV, PROXY_IMAGE_ENV,
};
use crate::snapshot::ClusterSnapshot;
use crate::{planner, render};

/// Steady-state resync interval: a periodic timer backs up the watch.
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Requeue delay after a transient failure.
const RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Requeue delay after an optimistic-concurrency conflict. The full cycle
/// re-runs against a fresh snapshot, so retry promptly.
const CONFLICT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("conflicting write to {resource}, retrying full cycle")]
    Conflict { resource: String },
}

/// Shared state for the reconciliation loop.
pub struct Context {
    pub client: Client,
    /// Namespace the proxy ConfigMap and Deployment are managed in.
    pub namespace: String,
    /// Name of the managed proxy instance.
    pub instance: String,
    /// Optional label selector restricting which ingresses participate.
    pub selector: Option<String>,
    pub proxy_image: String,
    pub extract_image: String,
}

impl Context {
    pub fn new(client: Client, namespace: String, instance: String, selector: Option<String>) -> Self {
        Context {
            client,
            namespace,
            instance,
            selector,
            proxy_image: std::env::var(PROXY_IMAGE_ENV)
                .unwrap_or_else(|_| DEFAULT_PROXY_IMAGE.to_string()),
            extract_image: std::env::var(EXTRACT_IMAGE_ENV)
                .unwrap_or_else(|_| DEFAULT_EXTRACT_IMAGE.to_string()),
        }
    }
}

/// Requeue schedule for a failed reconcile.
///
/// Conflicts re-run promptly against a fresh snapshot; other errors back
/// off. Split out from `error_policy` so the schedule is testable without a
/// live client.
pub fn requeue_delay(error: &ReconcileError) -> Duration {
    match error {
        ReconcileError::Conflict { .. } => CONFLICT_RETRY_INTERVAL,
        ReconcileError::Kube(_) => RETRY_INTERVAL,
    }
}

/// Reconcile one change notification.
///
/// Which ingress changed is irrelevant: any change invalidates the whole
/// render, so every pass recomputes everything from a fresh snapshot.
pub async fn reconcile(_ingress: Arc<Ingress>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let snapshot = gather_snapshot(&ctx).await?;
    let plan = planner::synthesize(&snapshot);

    for rejection in &plan.rejections {
        warn!(
            ingress = %rejection.ingress,
            rule = rejection.rule_index,
            reason = %rejection.reason,
            "Rejected route rule"
        );
    }

    let config = render::haproxy_cfg(&plan);
    apply::apply(&ctx, &plan, config).await?;

    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Take an immutable, point-in-time snapshot of the routing inputs.
///
/// Services are listed per referenced namespace (release siblings are found
/// by label, so the whole namespace is needed); secrets are fetched
/// individually since only referenced ones matter.
async fn gather_snapshot(ctx: &Context) -> Result<ClusterSnapshot, ReconcileError> {
    let mut params = ListParams::default();
    if let Some(selector) = &ctx.selector {
        params = params.labels(selector);
    }

    let ingress_api: Api<Ingress> = Api::all(ctx.client.clone());
    let ingresses = ingress_api.list(&params).await?.items;

    let mut namespaces = BTreeSet::new();
    let mut secret_refs = BTreeSet::new();
    for ingress in &ingresses {
        let Some(namespace) = ingress.metadata.namespace.clone() else {
            continue;
        };
        for tls in ingress
            .spec
            .as_ref()
            .and_then(|s| s.tls.as_deref())
            .unwrap_or_default()
        {
            if let Some(secret_name) = &tls.secret_name {
                secret_refs.insert((namespace.clone(), secret_name.clone()));
            }
        }
        namespaces.insert(namespace);
    }

    let mut services: Vec<Service> = Vec::new();
    for namespace in &namespaces {
        let service_api: Api<Service> = Api::namespaced(ctx.client.clone(), namespace);
        services.extend(service_api.list(&ListParams::default()).await?.items);
    }

    let mut secrets: Vec<Secret> = Vec::new();
    for (namespace, name) in &secret_refs {
        let secret_api: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
        match secret_api.get(name).await {
            Ok(secret) => secrets.push(secret),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                // The cert planner reports the omission; the render proceeds.
            }
            Err(err) => return Err(err.into()),
        }
    }

    let snapshot = ClusterSnapshot::assemble(ingresses, services, secrets);
    info!(
        ingresses = snapshot.ingresses.len(),
        services = snapshot.services.len(),
        secrets = snapshot.secrets.len(),
        "Snapshot gathered"
    );
    Ok(snapshot)
}
