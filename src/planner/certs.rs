//! Certificate pipeline, planning half.
//!
//! Enumerates the TLS secrets referenced by the snapshot as an ordered list
//! of (namespace, name, version) records. The record list does double duty:
//! it tells the extraction step what to fetch, and, embedded verbatim in
//! the pod template, it is the token whose change triggers a rollout.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use crate::snapshot::ClusterSnapshot;

/// One referenced TLS secret at a specific version.
///
/// Wire form is `namespace/name@version`, one argument per record on the
/// extraction step's command line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SecretVersionRecord {
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl fmt::Display for SecretVersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.namespace, self.name, self.version)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordParseError {
    #[error("expected namespace/name@version, got {0:?}")]
    Malformed(String),
}

impl FromStr for SecretVersionRecord {
    type Err = RecordParseError;

    /// Namespaces and secret names cannot contain `/` or `@`, so the first
    /// `/` and the last `@` are unambiguous separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || RecordParseError::Malformed(s.to_string());
        let (namespace, rest) = s.split_once('/').ok_or_else(malformed)?;
        let (name, version) = rest.rsplit_once('@').ok_or_else(malformed)?;
        if namespace.is_empty() || name.is_empty() || version.is_empty() {
            return Err(malformed());
        }
        Ok(SecretVersionRecord {
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

/// Enumerate referenced TLS secrets with their snapshot versions, sorted by
/// (namespace, name).
///
/// A referenced secret missing from the snapshot is warned about and
/// omitted; when it appears later the record list changes, which is exactly
/// the rollout trigger.
pub fn plan_secret_records(snapshot: &ClusterSnapshot) -> Vec<SecretVersionRecord> {
    let mut referenced = BTreeSet::new();
    for ingress in &snapshot.ingresses {
        for secret_name in &ingress.tls_secrets {
            referenced.insert((ingress.namespace.clone(), secret_name.clone()));
        }
    }

    referenced
        .into_iter()
        .filter_map(|key| match snapshot.secrets.get(&key) {
            Some(secret) => Some(SecretVersionRecord {
                namespace: secret.namespace.clone(),
                name: secret.name.clone(),
                version: secret.version.clone(),
            }),
            None => {
                warn!(
                    namespace = %key.0,
                    secret = %key.1,
                    "Referenced TLS secret not in snapshot, omitting"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "certs_test.rs"]
mod tests;
