//! Apply layer: push the rendered artifacts with optimistic concurrency.
//!
//! ConfigMaps are versioned: each distinct rendering gets its own
//! generate-named ConfigMap, and the Deployment's annotation names the one
//! in use. Re-renders of unchanged input reuse the live ConfigMap and skip
//! the Deployment write entirely, so steady state produces no churn.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, ResourceExt};
use tracing::{debug, info, warn};

use crate::consts::{CONFIG_KEY, CONFIG_VERSION_ANNOTATION, EXTRACT_CONTAINER_NAME};
use crate::controller::{Context, ReconcileError};
use crate::planner::RenderPlan;
use crate::rollout::{self, RolloutParams};

/// Push one synthesis result. Any conflict aborts the pass; the caller
/// retries the whole snapshot→synthesize→compare→apply cycle.
pub async fn apply(ctx: &Context, plan: &RenderPlan, config: String) -> Result<(), ReconcileError> {
    let cm_api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let dep_api: Api<Deployment> = Api::namespaced(ctx.client.clone(), &ctx.namespace);

    let live = get_opt(dep_api.get(&ctx.instance).await)?;

    let data: BTreeMap<String, String> = [(CONFIG_KEY.to_string(), config)].into_iter().collect();
    let configmap = ensure_configmap(&cm_api, ctx, live.as_ref(), data).await?;
    let configmap_name = configmap.name_any();

    let args = rollout::extraction_args(&plan.secret_records);
    if let Some(live_dep) = &live {
        if is_current(live_dep, &configmap_name, &args) {
            info!(
                deployment = %ctx.instance,
                configmap = %configmap_name,
                "Live deployment is up to date"
            );
            return Ok(());
        }
    }

    let desired = rollout::build_deployment(&RolloutParams {
        namespace: &ctx.namespace,
        instance: &ctx.instance,
        configmap_name: &configmap_name,
        records: &plan.secret_records,
        proxy_image: &ctx.proxy_image,
        extract_image: &ctx.extract_image,
    });

    let applied = replace_or_create(&dep_api, live, desired, &ctx.instance).await?;
    ensure_owner_ref(&cm_api, configmap, &applied).await
}

/// Whether the live Deployment already embeds this rendering.
///
/// The two rollout-invalidation tokens are the ConfigMap reference and the
/// extraction argument list; if both match, the pod template is unchanged.
pub fn is_current(live: &Deployment, configmap_name: &str, args: &[String]) -> bool {
    let annotation_matches = live
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(CONFIG_VERSION_ANNOTATION))
        .is_some_and(|name| name == configmap_name);

    let args_match = live
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.init_containers.as_ref())
        .and_then(|cs| cs.iter().find(|c| c.name == EXTRACT_CONTAINER_NAME))
        .and_then(|c| c.args.as_ref())
        .is_some_and(|live_args| live_args.as_slice() == args);

    annotation_matches && args_match
}

/// Reuse the live ConfigMap when its data already matches, otherwise create
/// a new generate-named version.
async fn ensure_configmap(
    cm_api: &Api<ConfigMap>,
    ctx: &Context,
    live: Option<&Deployment>,
    data: BTreeMap<String, String>,
) -> Result<ConfigMap, ReconcileError> {
    if let Some(current) = live
        .and_then(|dep| dep.metadata.annotations.as_ref())
        .and_then(|a| a.get(CONFIG_VERSION_ANNOTATION))
    {
        match get_opt(cm_api.get(current).await)? {
            Some(existing) if existing.data.as_ref() == Some(&data) => {
                info!(configmap = %current, "Existing ConfigMap is up to date");
                return Ok(existing);
            }
            Some(_) => {
                debug!(configmap = %current, "Rendered configuration differs from live ConfigMap");
            }
            None => {
                warn!(configmap = %current, "Annotated ConfigMap is gone, creating a new one");
            }
        }
    }

    let configmap = ConfigMap {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", ctx.instance)),
            namespace: Some(ctx.namespace.clone()),
            labels: Some(rollout::instance_labels(&ctx.instance)),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };
    let created = cm_api.create(&PostParams::default(), &configmap).await?;
    info!(configmap = %created.name_any(), "Created new ConfigMap");
    Ok(created)
}

async fn replace_or_create(
    dep_api: &Api<Deployment>,
    live: Option<Deployment>,
    mut desired: Deployment,
    instance: &str,
) -> Result<Deployment, ReconcileError> {
    match live {
        Some(live_dep) => {
            // Conditional update against the observed version; a concurrent
            // writer surfaces as a 409 rather than a lost update.
            desired.metadata.resource_version = live_dep.metadata.resource_version.clone();
            match dep_api.replace(instance, &PostParams::default(), &desired).await {
                Ok(applied) => {
                    info!(deployment = %instance, "Updated deployment");
                    Ok(applied)
                }
                Err(kube::Error::Api(err)) if err.code == 409 => Err(ReconcileError::Conflict {
                    resource: format!("deployment/{instance}"),
                }),
                Err(err) => Err(err.into()),
            }
        }
        None => match dep_api.create(&PostParams::default(), &desired).await {
            Ok(applied) => {
                info!(deployment = %instance, "Created deployment");
                Ok(applied)
            }
            Err(kube::Error::Api(err)) if err.code == 409 => Err(ReconcileError::Conflict {
                resource: format!("deployment/{instance}"),
            }),
            Err(err) => Err(err.into()),
        },
    }
}

/// Owning the ConfigMap from the Deployment garbage-collects stale versions
/// when the instance is deleted.
async fn ensure_owner_ref(
    cm_api: &Api<ConfigMap>,
    mut configmap: ConfigMap,
    deployment: &Deployment,
) -> Result<(), ReconcileError> {
    let Some(uid) = deployment.metadata.uid.clone() else {
        return Ok(());
    };
    let refs = configmap.metadata.owner_references.get_or_insert_with(Vec::new);
    if refs.iter().any(|r| r.uid == uid) {
        return Ok(());
    }
    refs.push(OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: "Deployment".to_string(),
        name: deployment.name_any(),
        uid,
        ..Default::default()
    });

    let name = configmap.name_any();
    match cm_api.replace(&name, &PostParams::default(), &configmap).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 409 => Err(ReconcileError::Conflict {
            resource: format!("configmap/{name}"),
        }),
        Err(err) => Err(err.into()),
    }
}

/// Map a 404 to `None`, propagating every other error.
fn get_opt<T>(result: Result<T, kube::Error>) -> Result<Option<T>, ReconcileError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
#[path = "apply_test.rs"]
mod tests;
