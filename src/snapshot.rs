//! Point-in-time view of the routing resources a render is computed from.
//!
//! Everything downstream of this module is pure: the planners and renderer
//! only ever see a `ClusterSnapshot`, never a live API client. All
//! collections are ordered (`BTreeMap`/`BTreeSet`, ingresses sorted by
//! namespace then name) so output can never depend on arrival order or hash
//! iteration order.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use kube::ResourceExt;
use tracing::warn;

use crate::consts::{DEFAULT_RELEASE_ANNOTATION, RELEASE_COOKIE_ANNOTATION, RELEASE_OF_LABEL};

/// (namespace, name) key used across all snapshot collections.
pub type ResourceKey = (String, String);

/// A service reference as declared by an ingress backend, with the port
/// already resolved to a number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BackendRef {
    pub service: String,
    pub port: i32,
}

/// One path entry under an ingress rule. `path: None` means the rule matches
/// on host alone.
#[derive(Debug, Clone)]
pub struct PathEntry {
    pub path: Option<String>,
    pub backend: BackendRef,
}

#[derive(Debug, Clone)]
pub struct RuleEntry {
    pub host: Option<String>,
    pub paths: Vec<PathEntry>,
}

#[derive(Debug, Clone)]
pub struct IngressEntry {
    pub namespace: String,
    pub name: String,
    pub rules: Vec<RuleEntry>,
    pub default_backend: Option<BackendRef>,
    pub tls_secrets: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct ServicePortEntry {
    pub name: Option<String>,
    pub port: i32,
}

#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub namespace: String,
    pub name: String,
    pub cluster_ip: String,
    pub ports: Vec<ServicePortEntry>,
    /// Stickiness cookie name, from the `ingrate.io/release-cookie` annotation.
    pub release_cookie: Option<String>,
    /// Which release sibling carries live weight, from the
    /// `ingrate.io/default-release` annotation.
    pub default_release: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SecretEntry {
    pub namespace: String,
    pub name: String,
    /// Opaque change token (`metadata.resourceVersion`). The compiler never
    /// looks at PEM payloads.
    pub version: String,
}

/// Immutable, versioned view handed to one synthesis pass.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    /// Sorted by (namespace, name).
    pub ingresses: Vec<IngressEntry>,
    pub services: BTreeMap<ResourceKey, ServiceEntry>,
    pub secrets: BTreeMap<ResourceKey, SecretEntry>,
    /// (namespace, owning service) -> names of its release siblings.
    pub releases: BTreeMap<ResourceKey, BTreeSet<String>>,
}

impl ClusterSnapshot {
    /// Fold raw API listings into the typed view.
    ///
    /// Services are converted first so ingress backends can resolve named
    /// ports against them. Malformed resources are warned about and skipped;
    /// they never abort the snapshot.
    pub fn assemble(ingresses: Vec<Ingress>, services: Vec<Service>, secrets: Vec<Secret>) -> Self {
        let mut service_map = BTreeMap::new();
        let mut releases: BTreeMap<ResourceKey, BTreeSet<String>> = BTreeMap::new();

        for svc in &services {
            let Some(entry) = ServiceEntry::from_resource(svc) else {
                continue;
            };
            if let Some(owner) = svc.labels().get(RELEASE_OF_LABEL) {
                releases
                    .entry((entry.namespace.clone(), owner.clone()))
                    .or_default()
                    .insert(entry.name.clone());
            }
            service_map.insert((entry.namespace.clone(), entry.name.clone()), entry);
        }

        let mut secret_map = BTreeMap::new();
        for secret in &secrets {
            let Some(entry) = SecretEntry::from_resource(secret) else {
                continue;
            };
            secret_map.insert((entry.namespace.clone(), entry.name.clone()), entry);
        }

        let mut entries: Vec<IngressEntry> = ingresses
            .iter()
            .filter_map(|ing| IngressEntry::from_resource(ing, &service_map))
            .collect();
        // Sort to stabilize output: listings arrive in server order.
        entries.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));

        ClusterSnapshot {
            ingresses: entries,
            services: service_map,
            secrets: secret_map,
            releases,
        }
    }

    /// Release siblings of the given service, if any are declared.
    pub fn siblings_of(&self, namespace: &str, service: &str) -> Option<&BTreeSet<String>> {
        self.releases
            .get(&(namespace.to_string(), service.to_string()))
            .filter(|set| !set.is_empty())
    }
}

impl ServiceEntry {
    fn from_resource(svc: &Service) -> Option<Self> {
        let name = svc.metadata.name.clone()?;
        let Some(namespace) = svc.metadata.namespace.clone() else {
            warn!(service = %name, "Service has no namespace, skipping");
            return None;
        };
        let spec = svc.spec.as_ref()?;
        let Some(cluster_ip) = spec.cluster_ip.clone().filter(|ip| ip.as_str() != "None") else {
            // Headless services have no stable address to route to.
            warn!(service = %name, namespace = %namespace, "Service has no cluster IP, skipping");
            return None;
        };
        let ports = spec
            .ports
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|p| ServicePortEntry {
                name: p.name.clone(),
                port: p.port,
            })
            .collect();
        let annotations = svc.annotations();
        Some(ServiceEntry {
            namespace,
            name,
            cluster_ip,
            ports,
            release_cookie: annotations.get(RELEASE_COOKIE_ANNOTATION).cloned(),
            default_release: annotations.get(DEFAULT_RELEASE_ANNOTATION).cloned(),
        })
    }

    /// Resolve a named service port to its number.
    pub fn port_number(&self, port_name: &str) -> Option<i32> {
        self.ports
            .iter()
            .find(|p| p.name.as_deref() == Some(port_name))
            .map(|p| p.port)
    }
}

impl SecretEntry {
    fn from_resource(secret: &Secret) -> Option<Self> {
        let name = secret.metadata.name.clone()?;
        let namespace = secret.metadata.namespace.clone()?;
        let Some(version) = secret.metadata.resource_version.clone() else {
            warn!(secret = %name, namespace = %namespace, "Secret has no resourceVersion, skipping");
            return None;
        };
        Some(SecretEntry {
            namespace,
            name,
            version,
        })
    }
}

impl IngressEntry {
    fn from_resource(
        ing: &Ingress,
        services: &BTreeMap<ResourceKey, ServiceEntry>,
    ) -> Option<Self> {
        let name = ing.metadata.name.clone()?;
        let Some(namespace) = ing.metadata.namespace.clone() else {
            warn!(ingress = %name, "Ingress has no namespace, skipping");
            return None;
        };
        let spec = ing.spec.as_ref()?;

        let mut rules = Vec::new();
        for rule in spec.rules.as_deref().unwrap_or_default() {
            let mut paths = Vec::new();
            if let Some(http) = &rule.http {
                for path in &http.paths {
                    let Some(backend) =
                        resolve_backend(&namespace, &name, &path.backend, services)
                    else {
                        continue;
                    };
                    paths.push(PathEntry {
                        path: path.path.clone(),
                        backend,
                    });
                }
            }
            rules.push(RuleEntry {
                host: rule.host.clone(),
                paths,
            });
        }

        let default_backend = spec
            .default_backend
            .as_ref()
            .and_then(|b| resolve_backend(&namespace, &name, b, services));

        let tls_secrets = spec
            .tls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|tls| tls.secret_name.clone())
            .collect();

        Some(IngressEntry {
            namespace,
            name,
            rules,
            default_backend,
            tls_secrets,
        })
    }
}

/// Resolve an ingress backend to (service, numeric port).
///
/// Named ports are looked up against the referenced Service; a backend whose
/// port cannot be resolved is skipped with a warning, as is a non-service
/// backend.
fn resolve_backend(
    namespace: &str,
    ingress: &str,
    backend: &IngressBackend,
    services: &BTreeMap<ResourceKey, ServiceEntry>,
) -> Option<BackendRef> {
    let Some(svc) = &backend.service else {
        warn!(ingress = %ingress, namespace = %namespace, "Skipping non-service ingress backend");
        return None;
    };
    let port = match &svc.port {
        Some(port_def) => {
            if let Some(number) = port_def.number {
                number
            } else if let Some(port_name) = &port_def.name {
                let key = (namespace.to_string(), svc.name.clone());
                match services.get(&key).and_then(|s| s.port_number(port_name)) {
                    Some(number) => number,
                    None => {
                        warn!(
                            ingress = %ingress,
                            namespace = %namespace,
                            service = %svc.name,
                            port = %port_name,
                            "Cannot resolve named service port, skipping backend"
                        );
                        return None;
                    }
                }
            } else {
                warn!(
                    ingress = %ingress,
                    namespace = %namespace,
                    service = %svc.name,
                    "Ingress backend has neither port number nor name, skipping"
                );
                return None;
            }
        }
        None => {
            warn!(
                ingress = %ingress,
                namespace = %namespace,
                service = %svc.name,
                "Ingress backend has no port, skipping"
            );
            return None;
        }
    };
    Some(BackendRef {
        service: svc.name.clone(),
        port,
    })
}

// Public within the test build: the planner tests reuse these fixtures.
#[cfg(test)]
#[path = "snapshot_test.rs"]
pub mod tests;
