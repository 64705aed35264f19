use super::*;
use crate::snapshot::tests::{ingress, service};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, IngressRule, IngressServiceBackend, IngressSpec,
    ServiceBackendPort,
};
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use kube::api::ObjectMeta;

fn snapshot_of(ingresses: Vec<Ingress>) -> ClusterSnapshot {
    ClusterSnapshot::assemble(
        ingresses,
        vec![
            service("prod", "web", "10.0.0.1", 80),
            service("prod", "api", "10.0.0.2", 8080),
        ],
        vec![],
    )
}

fn default_only_ingress(namespace: &str, name: &str, svc: &str, port: i32) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            default_backend: Some(IngressBackend {
                service: Some(IngressServiceBackend {
                    name: svc.to_string(),
                    port: Some(ServiceBackendPort {
                        number: Some(port),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn hostless_pathless_ingress(namespace: &str, name: &str) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: None,
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: None,
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: "web".to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(80),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn host_and_path_produce_a_doubly_conditional_route() {
    // Scenario A: host plus root path, single backend.
    let (routes, rejections) = plan_routes(&snapshot_of(vec![ingress(
        "prod",
        "app",
        Some("a.example.com"),
        Some("/"),
        "web",
        80,
    )]));

    assert!(rejections.is_empty());
    assert_eq!(routes.len(), 1);
    assert_eq!(
        routes[0].condition,
        RouteCondition::HostAndPath {
            host: "a.example.com".to_string(),
            path: "/".to_string(),
        }
    );
    assert_eq!(routes[0].backend.service, "web");
    assert_eq!(routes[0].backend.port, 80);
}

#[test]
fn path_only_and_host_only_rules_take_single_conditions() {
    let (routes, _) = plan_routes(&snapshot_of(vec![
        ingress("prod", "a", None, Some("/api"), "api", 8080),
        ingress("prod", "b", Some("b.example.com"), None, "web", 80),
    ]));

    assert_eq!(routes.len(), 2);
    assert_eq!(
        routes[0].condition,
        RouteCondition::Path {
            path: "/api".to_string()
        }
    );
    assert_eq!(
        routes[1].condition,
        RouteCondition::Host {
            host: "b.example.com".to_string()
        }
    );
}

#[test]
fn default_only_ingress_emits_one_unconditional_directive() {
    // Scenario B: no rules, just a default backend.
    let (routes, rejections) =
        plan_routes(&snapshot_of(vec![default_only_ingress("prod", "app", "web", 80)]));

    assert!(rejections.is_empty());
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].condition, RouteCondition::Default);
    assert_eq!(routes[0].backend.service, "web");
    assert!(routes[0].annotation.ends_with("default"));
}

#[test]
fn hostless_pathless_rule_is_rejected_not_rendered() {
    let (routes, rejections) =
        plan_routes(&snapshot_of(vec![hostless_pathless_ingress("prod", "bad")]));

    assert!(routes.is_empty());
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].ingress, "prod/bad");
    assert_eq!(rejections[0].reason, RejectionReason::InvalidIngressSpec);
}

#[test]
fn rejection_spares_the_rest_of_the_ingress() {
    // One invalid entry and one valid entry in the same ingress: only the
    // invalid entry is refused.
    let mut ing = hostless_pathless_ingress("prod", "mixed");
    ing.spec
        .as_mut()
        .unwrap()
        .rules
        .as_mut()
        .unwrap()
        .push(IngressRule {
            host: Some("ok.example.com".to_string()),
            http: Some(HTTPIngressRuleValue {
                paths: vec![HTTPIngressPath {
                    path: Some("/".to_string()),
                    path_type: "Prefix".to_string(),
                    backend: IngressBackend {
                        service: Some(IngressServiceBackend {
                            name: "web".to_string(),
                            port: Some(ServiceBackendPort {
                                number: Some(80),
                                ..Default::default()
                            }),
                        }),
                        ..Default::default()
                    },
                }],
            }),
        });

    let (routes, rejections) = plan_routes(&snapshot_of(vec![ing]));
    assert_eq!(routes.len(), 1);
    assert_eq!(rejections.len(), 1);
}

#[test]
fn directives_follow_canonical_order_not_arrival_order() {
    let ings = vec![
        ingress("zeta", "z", Some("z.example.com"), Some("/"), "web", 80),
        ingress("alpha", "a", Some("a.example.com"), Some("/"), "web", 80),
    ];
    // Services only exist in "prod" in snapshot_of; build one with both
    // namespaces covered.
    let snapshot = ClusterSnapshot::assemble(
        ings,
        vec![
            service("zeta", "web", "10.0.0.1", 80),
            service("alpha", "web", "10.0.0.2", 80),
        ],
        vec![],
    );

    let (routes, _) = plan_routes(&snapshot);
    assert_eq!(routes[0].annotation, "alpha/a");
    assert_eq!(routes[1].annotation, "zeta/z");
}

#[test]
fn paths_within_a_rule_sort_by_path_string() {
    let mut ing = ingress("prod", "app", Some("a.example.com"), Some("/zz"), "web", 80);
    ing.spec.as_mut().unwrap().rules.as_mut().unwrap()[0]
        .http
        .as_mut()
        .unwrap()
        .paths
        .push(HTTPIngressPath {
            path: Some("/aa".to_string()),
            path_type: "Prefix".to_string(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: "api".to_string(),
                    port: Some(ServiceBackendPort {
                        number: Some(8080),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            },
        });

    let (routes, _) = plan_routes(&snapshot_of(vec![ing]));
    let paths: Vec<_> = routes
        .iter()
        .map(|r| match &r.condition {
            RouteCondition::HostAndPath { path, .. } => path.as_str(),
            other => panic!("unexpected condition: {other:?}"),
        })
        .collect();
    assert_eq!(paths, vec!["/aa", "/zz"]);
}

#[test]
fn default_directives_come_after_all_conditional_directives() {
    let (routes, _) = plan_routes(&snapshot_of(vec![
        default_only_ingress("prod", "aaa-default", "web", 80),
        ingress("prod", "zzz-rules", Some("z.example.com"), Some("/"), "api", 8080),
    ]));

    assert_eq!(routes.len(), 2);
    assert!(matches!(
        routes[0].condition,
        RouteCondition::HostAndPath { .. }
    ));
    assert_eq!(routes[1].condition, RouteCondition::Default);
}
