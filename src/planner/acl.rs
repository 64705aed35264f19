//! Path-prefix ACL table.
//!
//! Every distinct path string referenced by any ingress rule gets a short
//! identifier derived from the path alone, so an identifier never shifts when
//! unrelated paths come and go.

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};

use crate::snapshot::ClusterSnapshot;

/// Identifier width in hex characters.
const ACL_ID_LEN: usize = 10;

/// Identifier for one path string: a fixed-width prefix of its SHA-256.
///
/// A pure function of the path; collisions across a realistic rule set are
/// treated as negligible and are not checked for.
pub fn path_id(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    digest
        .iter()
        .take(ACL_ID_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Collect every distinct non-null path in the snapshot and assign each its
/// identifier. Input ordering cannot leak into the table: paths are gathered
/// into a `BTreeSet` first.
pub fn build_table(snapshot: &ClusterSnapshot) -> BTreeMap<String, String> {
    let mut paths = BTreeSet::new();
    for ingress in &snapshot.ingresses {
        for rule in &ingress.rules {
            for entry in &rule.paths {
                if let Some(path) = &entry.path {
                    paths.insert(path.clone());
                }
            }
        }
    }
    paths
        .into_iter()
        .map(|path| {
            let id = path_id(&path);
            (path, id)
        })
        .collect()
}

#[cfg(test)]
#[path = "acl_test.rs"]
mod tests;
