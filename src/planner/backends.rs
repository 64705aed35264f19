//! Backend planning: one record per referenced (namespace, service, port).
//!
//! Balancing is always round robin. A service with release siblings gets one
//! weighted server per sibling; the weight is a hard 0/100 toggle selected by
//! the owning service's default-release annotation, not a proportional split.

use std::collections::BTreeSet;

use tracing::warn;

use crate::planner::{BackendKey, RouteDirective};
use crate::snapshot::ClusterSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendServer {
    pub name: String,
    pub cluster_ip: String,
    pub port: i32,
    /// 100 for the live release, 0 for standby siblings.
    pub weight: u32,
    /// Stickiness cookie value, present when the backend has a cookie.
    pub cookie_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub key: BackendKey,
    /// Stickiness cookie name, when the owning service declares one and the
    /// backend has siblings to stick to.
    pub cookie: Option<String>,
    pub servers: Vec<BackendServer>,
}

/// Plan one backend per distinct key referenced by the route directives,
/// in sorted key order.
pub fn plan_backends(snapshot: &ClusterSnapshot, routes: &[RouteDirective]) -> Vec<Backend> {
    let keys: BTreeSet<&BackendKey> = routes.iter().map(|r| &r.backend).collect();
    keys.into_iter()
        .map(|key| plan_backend(snapshot, key))
        .collect()
}

fn plan_backend(snapshot: &ClusterSnapshot, key: &BackendKey) -> Backend {
    let Some(owner) = snapshot
        .services
        .get(&(key.namespace.clone(), key.service.clone()))
    else {
        // Emit a server-less backend so the config still parses and the
        // route answers 503 instead of disappearing without trace.
        warn!(backend = %key, "Referenced service not in snapshot, emitting empty backend");
        return Backend {
            key: key.clone(),
            cookie: None,
            servers: Vec::new(),
        };
    };

    match snapshot.siblings_of(&key.namespace, &key.service) {
        Some(siblings) => {
            // Stickiness only matters once there is more than one server to
            // stick to.
            let cookie = owner.release_cookie.clone();
            let servers = siblings
                .iter()
                .filter_map(|sibling| {
                    let Some(svc) = snapshot
                        .services
                        .get(&(key.namespace.clone(), sibling.clone()))
                    else {
                        warn!(
                            backend = %key,
                            sibling = %sibling,
                            "Release sibling has no Service, skipping server"
                        );
                        return None;
                    };
                    let live = owner.default_release.as_deref() == Some(sibling.as_str());
                    Some(BackendServer {
                        name: sibling.clone(),
                        cluster_ip: svc.cluster_ip.clone(),
                        port: key.port,
                        weight: if live { 100 } else { 0 },
                        cookie_value: cookie.as_ref().map(|_| sibling.clone()),
                    })
                })
                .collect();
            Backend {
                key: key.clone(),
                cookie,
                servers,
            }
        }
        None => Backend {
            key: key.clone(),
            cookie: None,
            servers: vec![BackendServer {
                name: owner.name.clone(),
                cluster_ip: owner.cluster_ip.clone(),
                port: key.port,
                weight: 100,
                cookie_value: None,
            }],
        },
    }
}

#[cfg(test)]
#[path = "backends_test.rs"]
mod tests;
