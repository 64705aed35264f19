use super::*;
use crate::planner::routes::plan_routes;
use crate::snapshot::tests::{ingress, service, sibling_service};
use k8s_openapi::api::core::v1::Service;

fn canary_services(default_release: Option<&str>, cookie: Option<&str>) -> Vec<Service> {
    let mut owner = service("prod", "web", "10.0.0.1", 80);
    let mut annotations = std::collections::BTreeMap::new();
    if let Some(cookie) = cookie {
        annotations.insert(
            crate::consts::RELEASE_COOKIE_ANNOTATION.to_string(),
            cookie.to_string(),
        );
    }
    if let Some(rel) = default_release {
        annotations.insert(
            crate::consts::DEFAULT_RELEASE_ANNOTATION.to_string(),
            rel.to_string(),
        );
    }
    owner.metadata.annotations = Some(annotations);
    vec![
        owner,
        sibling_service("prod", "web-a", "10.0.1.1", 80, "web"),
        sibling_service("prod", "web-b", "10.0.1.2", 80, "web"),
    ]
}

fn plan_for(services: Vec<Service>) -> Vec<Backend> {
    let snapshot = ClusterSnapshot::assemble(
        vec![ingress("prod", "app", Some("a.example.com"), Some("/"), "web", 80)],
        services,
        vec![],
    );
    let (routes, _) = plan_routes(&snapshot);
    plan_backends(&snapshot, &routes)
}

#[test]
fn plain_service_gets_a_single_uncookied_server() {
    let backends = plan_for(vec![service("prod", "web", "10.0.0.1", 80)]);

    assert_eq!(backends.len(), 1);
    let backend = &backends[0];
    assert_eq!(backend.cookie, None);
    assert_eq!(backend.servers.len(), 1);
    let server = &backend.servers[0];
    assert_eq!(server.name, "web");
    assert_eq!(server.cluster_ip, "10.0.0.1");
    assert_eq!(server.port, 80);
    assert_eq!(server.cookie_value, None);
}

#[test]
fn canary_siblings_get_hard_on_off_weights() {
    let backends = plan_for(canary_services(Some("web-a"), Some("rel")));

    let backend = &backends[0];
    assert_eq!(backend.cookie.as_deref(), Some("rel"));
    assert_eq!(backend.servers.len(), 2);

    let a = backend.servers.iter().find(|s| s.name == "web-a").unwrap();
    let b = backend.servers.iter().find(|s| s.name == "web-b").unwrap();
    assert_eq!((a.weight, b.weight), (100, 0));
    assert_eq!(a.cookie_value.as_deref(), Some("web-a"));
    assert_eq!(b.cookie_value.as_deref(), Some("web-b"));
    assert_eq!(a.cluster_ip, "10.0.1.1");
    assert_eq!(b.cluster_ip, "10.0.1.2");
}

#[test]
fn flipping_the_default_release_flips_the_weights() {
    let before = plan_for(canary_services(Some("web-a"), Some("rel")));
    let after = plan_for(canary_services(Some("web-b"), Some("rel")));

    let weights = |backends: &[Backend]| {
        let b = &backends[0];
        (
            b.servers.iter().find(|s| s.name == "web-a").unwrap().weight,
            b.servers.iter().find(|s| s.name == "web-b").unwrap().weight,
        )
    };
    assert_eq!(weights(&before), (100, 0));
    assert_eq!(weights(&after), (0, 100));
}

#[test]
fn no_default_release_means_all_siblings_standby() {
    let backends = plan_for(canary_services(None, None));

    let backend = &backends[0];
    assert!(backend.servers.iter().all(|s| s.weight == 0));
    assert!(backend.servers.iter().all(|s| s.cookie_value.is_none()));
}

#[test]
fn missing_service_yields_an_empty_backend_not_a_dropped_route() {
    let backends = plan_for(vec![]);

    assert_eq!(backends.len(), 1);
    assert!(backends[0].servers.is_empty());
    assert_eq!(backends[0].cookie, None);
}

#[test]
fn shared_backend_key_is_planned_once() {
    let snapshot = ClusterSnapshot::assemble(
        vec![
            ingress("prod", "a", Some("a.example.com"), Some("/"), "web", 80),
            ingress("prod", "b", Some("b.example.com"), Some("/api"), "web", 80),
        ],
        vec![service("prod", "web", "10.0.0.1", 80)],
        vec![],
    );
    let (routes, _) = plan_routes(&snapshot);
    assert_eq!(routes.len(), 2);

    let backends = plan_backends(&snapshot, &routes);
    assert_eq!(backends.len(), 1);
}

#[test]
fn backends_come_out_in_sorted_key_order() {
    let snapshot = ClusterSnapshot::assemble(
        vec![
            ingress("prod", "z", Some("z.example.com"), Some("/"), "zeta", 80),
            ingress("prod", "a", Some("a.example.com"), Some("/"), "alpha", 80),
        ],
        vec![
            service("prod", "zeta", "10.0.0.1", 80),
            service("prod", "alpha", "10.0.0.2", 80),
        ],
        vec![],
    );
    let (routes, _) = plan_routes(&snapshot);
    let backends = plan_backends(&snapshot, &routes);

    let names: Vec<_> = backends.iter().map(|b| b.key.service.as_str()).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}
