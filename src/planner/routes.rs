//! Route directive planning.
//!
//! Converts (ingress, rule, path) combinations into an ordered directive
//! list. Emission order is match precedence: first match wins at evaluation
//! time, and the order is canonical (namespace, ingress name, rule index,
//! path string) rather than arrival order.

use thiserror::Error;
use tracing::warn;

use crate::planner::BackendKey;
use crate::snapshot::{ClusterSnapshot, IngressEntry};

/// Under which condition a directive fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteCondition {
    /// Host match AND path-prefix ACL.
    HostAndPath { host: String, path: String },
    /// Path-prefix ACL only.
    Path { path: String },
    /// Host match only.
    Host { host: String },
    /// Unconditional default-backend fallback, evaluated after every
    /// conditional directive.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDirective {
    pub condition: RouteCondition,
    pub backend: BackendKey,
    /// Originating ingress, rendered as a config comment.
    pub annotation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    /// A rule entry with neither host nor path would be an unconditional
    /// route shadowing any declared default backend.
    #[error("rule has neither host nor path; refusing to emit an unconditional route")]
    InvalidIngressSpec,
}

/// One refused rule entry. The offending entry is skipped; the rest of the
/// owning ingress still renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// `namespace/name` of the owning ingress.
    pub ingress: String,
    pub rule_index: usize,
    pub reason: RejectionReason,
}

/// Plan all route directives for the snapshot.
///
/// Conditional directives come first, in canonical order; then one
/// unconditional default-backend directive per declaring ingress, in the
/// same ingress order.
pub fn plan_routes(snapshot: &ClusterSnapshot) -> (Vec<RouteDirective>, Vec<Rejection>) {
    let mut routes = Vec::new();
    let mut rejections = Vec::new();

    for ingress in &snapshot.ingresses {
        plan_ingress_rules(ingress, &mut routes, &mut rejections);
    }

    for ingress in &snapshot.ingresses {
        if let Some(backend) = &ingress.default_backend {
            routes.push(RouteDirective {
                condition: RouteCondition::Default,
                backend: BackendKey {
                    namespace: ingress.namespace.clone(),
                    service: backend.service.clone(),
                    port: backend.port,
                },
                annotation: format!("{}/{} default", ingress.namespace, ingress.name),
            });
        }
    }

    (routes, rejections)
}

fn plan_ingress_rules(
    ingress: &IngressEntry,
    routes: &mut Vec<RouteDirective>,
    rejections: &mut Vec<Rejection>,
) {
    let origin = format!("{}/{}", ingress.namespace, ingress.name);

    for (rule_index, rule) in ingress.rules.iter().enumerate() {
        // Canonical order within a rule is by path string, not declaration
        // order.
        let mut entries: Vec<_> = rule.paths.iter().collect();
        entries.sort_by_key(|e| e.path.clone().unwrap_or_default());

        for entry in entries {
            let condition = match (&rule.host, &entry.path) {
                (Some(host), Some(path)) => RouteCondition::HostAndPath {
                    host: host.clone(),
                    path: path.clone(),
                },
                (None, Some(path)) => RouteCondition::Path { path: path.clone() },
                (Some(host), None) => RouteCondition::Host { host: host.clone() },
                (None, None) => {
                    warn!(
                        ingress = %origin,
                        rule = rule_index,
                        "Rejecting rule with neither host nor path"
                    );
                    rejections.push(Rejection {
                        ingress: origin.clone(),
                        rule_index,
                        reason: RejectionReason::InvalidIngressSpec,
                    });
                    continue;
                }
            };
            routes.push(RouteDirective {
                condition,
                backend: BackendKey {
                    namespace: ingress.namespace.clone(),
                    service: entry.backend.service.clone(),
                    port: entry.backend.port,
                },
                annotation: origin.clone(),
            });
        }
    }
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
