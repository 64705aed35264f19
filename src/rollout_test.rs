use super::*;

fn records() -> Vec<SecretVersionRecord> {
    vec![
        SecretVersionRecord {
            namespace: "prod".to_string(),
            name: "a-tls".to_string(),
            version: "100".to_string(),
        },
        SecretVersionRecord {
            namespace: "prod".to_string(),
            name: "b-tls".to_string(),
            version: "200".to_string(),
        },
    ]
}

fn params<'a>(records: &'a [SecretVersionRecord]) -> RolloutParams<'a> {
    RolloutParams {
        namespace: "edge",
        instance: "gateway",
        configmap_name: "gateway-x7k2p",
        records,
        proxy_image: "haproxy:2.9-alpine",
        extract_image: "ingrate:latest",
    }
}

fn pod_spec(deployment: &Deployment) -> &PodSpec {
    deployment
        .spec
        .as_ref()
        .unwrap()
        .template
        .spec
        .as_ref()
        .unwrap()
}

#[test]
fn single_replica_with_surge_one_unavailable_zero() {
    let records = records();
    let deployment = build_deployment(&params(&records));
    let spec = deployment.spec.as_ref().unwrap();

    assert_eq!(spec.replicas, Some(1));
    let strategy = spec.strategy.as_ref().unwrap();
    assert_eq!(strategy.type_.as_deref(), Some("RollingUpdate"));
    let rolling = strategy.rolling_update.as_ref().unwrap();
    assert_eq!(rolling.max_surge, Some(IntOrString::Int(1)));
    assert_eq!(rolling.max_unavailable, Some(IntOrString::Int(0)));
}

#[test]
fn records_are_embedded_verbatim_as_extraction_args() {
    let records = records();
    let deployment = build_deployment(&params(&records));

    let init = &pod_spec(&deployment).init_containers.as_ref().unwrap()[0];
    assert_eq!(init.name, EXTRACT_CONTAINER_NAME);
    assert_eq!(
        init.args.as_ref().unwrap(),
        &vec!["prod/a-tls@100".to_string(), "prod/b-tls@200".to_string()]
    );
    // The extraction step sees only the certificate directory.
    let mounts = init.volume_mounts.as_ref().unwrap();
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].mount_path, CERT_DIR);
}

#[test]
fn version_bump_changes_the_pod_template() {
    let before_records = records();
    let mut after_records = records();
    after_records[0].version = "101".to_string();

    let before = build_deployment(&params(&before_records));
    let after = build_deployment(&params(&after_records));

    let template = |d: &Deployment| {
        serde_json::to_string(&d.spec.as_ref().unwrap().template).unwrap()
    };
    assert_ne!(template(&before), template(&after));
}

#[test]
fn identical_input_builds_an_identical_template() {
    let records = records();
    let before = serde_json::to_string(&build_deployment(&params(&records))).unwrap();
    let after = serde_json::to_string(&build_deployment(&params(&records))).unwrap();
    assert_eq!(before, after);
}

#[test]
fn proxy_mounts_config_read_only_and_probes_the_data_port() {
    let records = records();
    let deployment = build_deployment(&params(&records));
    let proxy = &pod_spec(&deployment).containers[0];

    assert_eq!(proxy.name, PROXY_CONTAINER_NAME);

    let probe = proxy.readiness_probe.as_ref().unwrap();
    let tcp = probe.tcp_socket.as_ref().unwrap();
    assert_eq!(tcp.port, IntOrString::Int(HTTP_PORT));
    assert!(probe.http_get.is_none());

    let mounts = proxy.volume_mounts.as_ref().unwrap();
    let config = mounts.iter().find(|m| m.mount_path == CONFIG_DIR).unwrap();
    assert_eq!(config.read_only, Some(true));
}

#[test]
fn shutdown_drains_gracefully_with_a_long_grace_period() {
    let records = records();
    let deployment = build_deployment(&params(&records));
    let spec = pod_spec(&deployment);

    assert_eq!(
        spec.termination_grace_period_seconds,
        Some(DRAIN_GRACE_SECONDS)
    );

    let pre_stop = spec.containers[0]
        .lifecycle
        .as_ref()
        .unwrap()
        .pre_stop
        .as_ref()
        .unwrap();
    let command = pre_stop.exec.as_ref().unwrap().command.as_ref().unwrap();
    assert!(command.iter().any(|c| c.contains("USR1")));
}

#[test]
fn configmap_reference_lands_in_volume_and_annotation() {
    let records = records();
    let deployment = build_deployment(&params(&records));

    let annotation = deployment
        .metadata
        .annotations
        .as_ref()
        .unwrap()
        .get(CONFIG_VERSION_ANNOTATION)
        .unwrap();
    assert_eq!(annotation, "gateway-x7k2p");

    let volumes = pod_spec(&deployment).volumes.as_ref().unwrap();
    let config_volume = volumes
        .iter()
        .find_map(|v| v.config_map.as_ref())
        .unwrap();
    assert_eq!(config_volume.name, "gateway-x7k2p");
}

#[test]
fn manifest_survives_a_yaml_round_trip() {
    let records = records();
    let deployment = build_deployment(&params(&records));

    let yaml = serde_yaml::to_string(&deployment).unwrap();
    let back: Deployment = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(
        back.metadata.name.as_deref(),
        Some("gateway")
    );
    assert_eq!(
        serde_json::to_value(&deployment).unwrap(),
        serde_json::to_value(&back).unwrap()
    );
}
