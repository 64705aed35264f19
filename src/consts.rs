//! Annotation keys, labels, and fixed paths shared across the pipeline.

/// Annotation on a Service naming the stickiness cookie for its backend.
pub const RELEASE_COOKIE_ANNOTATION: &str = "ingrate.io/release-cookie";

/// Annotation on a Service naming which release sibling receives live traffic.
pub const DEFAULT_RELEASE_ANNOTATION: &str = "ingrate.io/default-release";

/// Label on a Service marking it as a release sibling of the named service.
pub const RELEASE_OF_LABEL: &str = "ingrate.io/release-of";

/// Label tying generated ConfigMaps and Deployments to their instance.
pub const INSTANCE_LABEL: &str = "ingrate.io/instance";

/// Deployment annotation naming the versioned ConfigMap currently in use.
pub const CONFIG_VERSION_ANNOTATION: &str = "ingrate.io/config-version";

pub const APP_LABEL_KEY: &str = "app.kubernetes.io/name";
pub const APP_LABEL_VALUE: &str = "ingrate";

/// Shared certificate directory: written by the extraction step, scanned by
/// HAProxy (`bind ... ssl crt`).
pub const CERT_DIR: &str = "/etc/ingrate/certs";

/// Mount point of the rendered configuration inside the proxy container.
/// HAProxy's stock image looks for haproxy.cfg here.
pub const CONFIG_DIR: &str = "/usr/local/etc/haproxy";

/// ConfigMap key holding the rendered configuration.
pub const CONFIG_KEY: &str = "haproxy.cfg";

pub const HTTP_PORT: i32 = 80;
pub const HTTPS_PORT: i32 = 443;

/// How long an outgoing proxy instance may keep draining before the
/// orchestrator force-kills it.
pub const DRAIN_GRACE_SECONDS: i64 = 3600;

pub const PROXY_IMAGE_ENV: &str = "INGRATE_PROXY_IMAGE";
pub const EXTRACT_IMAGE_ENV: &str = "INGRATE_EXTRACT_IMAGE";

pub const DEFAULT_PROXY_IMAGE: &str = "haproxy:2.9-alpine";
pub const DEFAULT_EXTRACT_IMAGE: &str = "ingrate:latest";

/// Name of the extraction init container inside the pod template. The apply
/// layer locates it by this name when comparing live and desired specs.
pub const EXTRACT_CONTAINER_NAME: &str = "cert-extract";

pub const PROXY_CONTAINER_NAME: &str = "haproxy";
