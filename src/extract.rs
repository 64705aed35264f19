//! Certificate extraction: the isolated step that runs once before the
//! proxy starts.
//!
//! The step's contract (and its only output channel) is the shared
//! certificate directory: a usable fallback bundle is always written first,
//! then one bundle per resolvable secret record. Per-record failures discard
//! only that bundle. An empty or truncated file would stop HAProxy from
//! starting, so a bundle either lands complete or not at all.

use std::path::{Path, PathBuf};
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use rcgen::{CertificateParams, DnType, KeyPair};
use thiserror::Error;
use tracing::{info, warn};

use crate::planner::SecretVersionRecord;

/// Standard PEM armor prefix; HAProxy's directory scan keys off the same
/// header.
pub const PEM_HEADER: &str = "-----BEGIN ";

/// Fallback bundle file. The `00-` prefix sorts it first so HAProxy uses it
/// as the default certificate when SNI matches nothing.
pub const FALLBACK_BUNDLE: &str = "00-fallback.pem";

const TLS_CERT_KEY: &str = "tls.crt";
const TLS_KEY_KEY: &str = "tls.key";

/// Per-secret fetch budget. A slow control plane degrades that one record,
/// not the whole step.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("secret has no {0} entry")]
    MissingKey(&'static str),

    #[error("secret {0} entry is not PEM-armored")]
    NotPem(&'static str),

    #[error("timed out fetching secret")]
    Timeout,

    #[error("certificate generation error: {0}")]
    Rcgen(#[from] rcgen::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Bundle file name for a secret, a pure function of namespace and name.
pub fn bundle_file_name(namespace: &str, name: &str) -> String {
    format!("{namespace}_{name}.pem")
}

/// Self-signed wildcard bundle so the proxy can always start, even with
/// zero resolvable secrets.
pub fn fallback_bundle_pem() -> Result<String, ExtractError> {
    let key_pair = KeyPair::generate()?;
    let mut params = CertificateParams::new(vec![
        "ingrate.invalid".to_string(),
        "*.ingrate.invalid".to_string(),
    ])?;
    params
        .distinguished_name
        .push(DnType::CommonName, "ingrate fallback");
    let cert = params.self_signed(&key_pair)?;
    Ok(format!("{}{}", cert.pem(), key_pair.serialize_pem()))
}

/// Generate and write the fallback bundle. Failure here is fatal to the
/// step: without it the proxy has no certificate at all to bind with.
pub fn write_fallback(dir: &Path) -> Result<PathBuf, ExtractError> {
    let path = dir.join(FALLBACK_BUNDLE);
    std::fs::write(&path, fallback_bundle_pem()?)?;
    info!(path = %path.display(), "Wrote fallback certificate bundle");
    Ok(path)
}

/// Combine a secret's certificate and key material into one HAProxy bundle.
///
/// Both entries must be present and PEM-armored; anything else fails this
/// record before a file is created.
pub fn bundle_from_secret(secret: &Secret) -> Result<String, ExtractError> {
    let data = secret.data.as_ref().ok_or(ExtractError::MissingKey(TLS_CERT_KEY))?;
    let cert = pem_entry(data, TLS_CERT_KEY)?;
    let key = pem_entry(data, TLS_KEY_KEY)?;
    let mut bundle = String::with_capacity(cert.len() + key.len() + 1);
    bundle.push_str(cert.trim_end());
    bundle.push('\n');
    bundle.push_str(key.trim_end());
    bundle.push('\n');
    Ok(bundle)
}

fn pem_entry<'a>(
    data: &'a std::collections::BTreeMap<String, k8s_openapi::ByteString>,
    key: &'static str,
) -> Result<&'a str, ExtractError> {
    let bytes = data.get(key).ok_or(ExtractError::MissingKey(key))?;
    let text = std::str::from_utf8(&bytes.0).map_err(|_| ExtractError::NotPem(key))?;
    if !text.trim_start().starts_with(PEM_HEADER) {
        return Err(ExtractError::NotPem(key));
    }
    Ok(text)
}

/// Fetch one record's live secret and write its bundle.
pub async fn extract_one(
    client: &Client,
    dir: &Path,
    record: &SecretVersionRecord,
) -> Result<PathBuf, ExtractError> {
    let api: Api<Secret> = Api::namespaced(client.clone(), &record.namespace);
    let secret = tokio::time::timeout(FETCH_TIMEOUT, api.get(&record.name))
        .await
        .map_err(|_| ExtractError::Timeout)??;

    let bundle = bundle_from_secret(&secret)?;
    let path = dir.join(bundle_file_name(&record.namespace, &record.name));
    if let Err(err) = std::fs::write(&path, &bundle) {
        // A partial bundle must not survive; HAProxy refuses empty or
        // truncated certificate files.
        let _ = std::fs::remove_file(&path);
        return Err(err.into());
    }
    Ok(path)
}

/// Process every record independently. Returns how many bundles were
/// written; failures are logged and skipped, never propagated.
pub async fn extract_all(client: &Client, dir: &Path, records: &[SecretVersionRecord]) -> usize {
    let mut written = 0;
    for record in records {
        match extract_one(client, dir, record).await {
            Ok(path) => {
                info!(
                    secret = %record,
                    path = %path.display(),
                    "Extracted certificate bundle"
                );
                written += 1;
            }
            Err(err) => {
                warn!(
                    secret = %record,
                    error = %err,
                    "Skipping certificate bundle, proxy will fall back for its hosts"
                );
            }
        }
    }
    written
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
