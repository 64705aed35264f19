//! Rollout specification: the Deployment whose pod template changes exactly
//! when a replacement is required.
//!
//! The template embeds two things that move: the versioned ConfigMap name
//! (volume source) and the extraction step's argument list (the sorted
//! secret-version records). Rotating a secret, adding or removing a TLS
//! reference, or changing routing all surface as a template change, which
//! the orchestrator answers with a rolling replacement. Nothing else in the
//! template varies between renders of identical input.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, ExecAction, Lifecycle,
    LifecycleHandler, PodSpec, PodTemplateSpec, Probe, TCPSocketAction, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use crate::consts::{
    APP_LABEL_KEY, APP_LABEL_VALUE, CERT_DIR, CONFIG_DIR, CONFIG_VERSION_ANNOTATION,
    DRAIN_GRACE_SECONDS, EXTRACT_CONTAINER_NAME, HTTPS_PORT, HTTP_PORT, INSTANCE_LABEL,
    PROXY_CONTAINER_NAME,
};
use crate::planner::SecretVersionRecord;

const CONFIG_VOLUME: &str = "haproxy-config";
const CERT_VOLUME: &str = "tls-certs";

/// Inputs for one Deployment build. Everything is borrowed; the builder is a
/// pure function of these values.
pub struct RolloutParams<'a> {
    pub namespace: &'a str,
    pub instance: &'a str,
    /// Name of the versioned ConfigMap holding the rendered configuration.
    pub configmap_name: &'a str,
    pub records: &'a [SecretVersionRecord],
    pub proxy_image: &'a str,
    pub extract_image: &'a str,
}

/// Labels shared by the Deployment, its pods, and its ConfigMaps.
pub fn instance_labels(instance: &str) -> BTreeMap<String, String> {
    [
        (APP_LABEL_KEY.to_string(), APP_LABEL_VALUE.to_string()),
        (INSTANCE_LABEL.to_string(), instance.to_string()),
    ]
    .into_iter()
    .collect()
}

/// The extraction step's argument list: one `namespace/name@version` string
/// per record, in record order.
pub fn extraction_args(records: &[SecretVersionRecord]) -> Vec<String> {
    records.iter().map(ToString::to_string).collect()
}

/// Assemble the proxy Deployment.
pub fn build_deployment(params: &RolloutParams<'_>) -> Deployment {
    let labels = instance_labels(params.instance);
    let annotations: BTreeMap<String, String> = [(
        CONFIG_VERSION_ANNOTATION.to_string(),
        params.configmap_name.to_string(),
    )]
    .into_iter()
    .collect();

    Deployment {
        metadata: ObjectMeta {
            name: Some(params.instance.to_string()),
            namespace: Some(params.namespace.to_string()),
            labels: Some(labels.clone()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            // One proxy instance; scaling the fleet is out of scope.
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            // The old instance keeps serving until the new one is ready.
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_surge: Some(IntOrString::Int(1)),
                    max_unavailable: Some(IntOrString::Int(0)),
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    termination_grace_period_seconds: Some(DRAIN_GRACE_SECONDS),
                    init_containers: Some(vec![extract_container(params)]),
                    containers: vec![proxy_container(params)],
                    volumes: Some(vec![
                        Volume {
                            name: CONFIG_VOLUME.to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: params.configmap_name.to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        Volume {
                            name: CERT_VOLUME.to_string(),
                            empty_dir: Some(EmptyDirVolumeSource::default()),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn extract_container(params: &RolloutParams<'_>) -> Container {
    Container {
        name: EXTRACT_CONTAINER_NAME.to_string(),
        image: Some(params.extract_image.to_string()),
        command: Some(vec!["ingrate-cert-extract".to_string()]),
        // The record list is the rollout-invalidation token: embedding it
        // verbatim makes every secret rotation a template change.
        args: Some(extraction_args(params.records)),
        volume_mounts: Some(vec![VolumeMount {
            name: CERT_VOLUME.to_string(),
            mount_path: CERT_DIR.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn proxy_container(params: &RolloutParams<'_>) -> Container {
    Container {
        name: PROXY_CONTAINER_NAME.to_string(),
        image: Some(params.proxy_image.to_string()),
        ports: Some(vec![
            ContainerPort {
                container_port: HTTP_PORT,
                name: Some("http".to_string()),
                ..Default::default()
            },
            ContainerPort {
                container_port: HTTPS_PORT,
                name: Some("https".to_string()),
                ..Default::default()
            },
        ]),
        // Ready as soon as the process accepts on the data port; no
        // synthetic-traffic health check.
        readiness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(HTTP_PORT),
                ..Default::default()
            }),
            period_seconds: Some(5),
            ..Default::default()
        }),
        // SIGUSR1 is HAProxy's graceful-stop signal: stop accepting, finish
        // in-flight connections, exit. The grace period gives long-lived
        // connections time to drain before the kill.
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                exec: Some(ExecAction {
                    command: Some(vec![
                        "/bin/sh".to_string(),
                        "-c".to_string(),
                        "kill -USR1 1".to_string(),
                    ]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        volume_mounts: Some(vec![
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_DIR.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
            VolumeMount {
                name: CERT_VOLUME.to_string(),
                mount_path: CERT_DIR.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "rollout_test.rs"]
mod tests;
