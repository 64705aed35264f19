//! HAProxy configuration rendering.
//!
//! Strictly the second stage of the pipeline: a pure function from a
//! `RenderPlan` to configuration text. All ordering decisions were made by
//! the planners; this module only formats. Equal plans must render to
//! byte-identical text.

use std::fmt::Write;

use crate::consts::{CERT_DIR, HTTPS_PORT, HTTP_PORT};
use crate::planner::{BackendKey, RenderPlan, RouteCondition};

/// Config section name for a backend key.
pub fn backend_name(key: &BackendKey) -> String {
    format!("be_{}_{}_{}", key.namespace, key.service, key.port)
}

/// ACL name for a path identifier.
fn acl_name(id: &str) -> String {
    format!("pfx_{id}")
}

/// Render the full haproxy.cfg for a plan.
pub fn haproxy_cfg(plan: &RenderPlan) -> String {
    let mut cfg = String::new();
    // String formatting is infallible; the expect never fires.
    render_into(&mut cfg, plan).expect("formatting into String cannot fail");
    cfg
}

fn render_into(out: &mut String, plan: &RenderPlan) -> std::fmt::Result {
    writeln!(out, "# Generated by ingrate. Do not edit.")?;
    writeln!(out)?;
    writeln!(out, "global")?;
    writeln!(out, "    log stdout format raw local0")?;
    writeln!(out, "    maxconn 4096")?;
    writeln!(out)?;
    writeln!(out, "defaults")?;
    writeln!(out, "    mode http")?;
    writeln!(out, "    log global")?;
    writeln!(out, "    option httplog")?;
    writeln!(out, "    timeout connect 5s")?;
    writeln!(out, "    timeout client 50s")?;
    writeln!(out, "    timeout server 50s")?;
    writeln!(out)?;

    writeln!(out, "frontend ingrate")?;
    writeln!(out, "    bind *:{HTTP_PORT}")?;
    // The cert directory always contains at least the fallback bundle, so
    // the TLS bind is unconditional.
    writeln!(out, "    bind *:{HTTPS_PORT} ssl crt {CERT_DIR}")?;

    if !plan.acls.is_empty() {
        writeln!(out)?;
        for (path, id) in &plan.acls {
            writeln!(out, "    acl {} path_beg {}", acl_name(id), path)?;
        }
    }

    if !plan.routes.is_empty() {
        writeln!(out)?;
        for route in &plan.routes {
            let target = backend_name(&route.backend);
            match &route.condition {
                RouteCondition::HostAndPath { host, path } => {
                    writeln!(
                        out,
                        "    use_backend {target} if {{ hdr(host) -i {host} }} {}  # {}",
                        path_acl(plan, path),
                        route.annotation
                    )?;
                }
                RouteCondition::Path { path } => {
                    writeln!(
                        out,
                        "    use_backend {target} if {}  # {}",
                        path_acl(plan, path),
                        route.annotation
                    )?;
                }
                RouteCondition::Host { host } => {
                    writeln!(
                        out,
                        "    use_backend {target} if {{ hdr(host) -i {host} }}  # {}",
                        route.annotation
                    )?;
                }
                RouteCondition::Default => {
                    writeln!(out, "    use_backend {target}  # {}", route.annotation)?;
                }
            }
        }
    }

    for backend in &plan.backends {
        writeln!(out)?;
        writeln!(out, "backend {}", backend_name(&backend.key))?;
        writeln!(out, "    balance roundrobin")?;
        if let Some(cookie) = &backend.cookie {
            writeln!(out, "    cookie {cookie} insert indirect preserve")?;
        }
        for server in &backend.servers {
            write!(
                out,
                "    server {} {}:{} weight {}",
                server.name, server.cluster_ip, server.port, server.weight
            )?;
            if let Some(value) = &server.cookie_value {
                write!(out, " cookie {value}")?;
            }
            writeln!(out)?;
        }
    }

    Ok(())
}

/// Named ACL reference for a path. Falls back to an anonymous ACL if the
/// path somehow missed the table; the planners populate the table from the
/// same inputs, so the fallback is unreachable in practice.
fn path_acl(plan: &RenderPlan, path: &str) -> String {
    match plan.acls.get(path) {
        Some(id) => acl_name(id),
        None => format!("{{ path_beg {path} }}"),
    }
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;
