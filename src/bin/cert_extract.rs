//! Extraction-step entrypoint, run as an init container before the proxy.
//!
//! Arguments are `namespace/name@version` records. A malformed or
//! unresolvable record degrades that one bundle and nothing else. The
//! step's only output channel is the certificate directory.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ingrate::extract;
use ingrate::planner::SecretVersionRecord;
use kube::Client;
use tracing::{info, warn};

/// Overall budget for the fetch loop. The pod restart policy deals with a
/// wedged control plane; this deadline just stops one hung fetch chain from
/// eating the whole grace period.
const OVERALL_DEADLINE: Duration = Duration::from_secs(120);

#[derive(clap::Parser, Debug)]
#[command(name = "ingrate-cert-extract", version, about, long_about = None)]
/// Write TLS certificate bundles for the proxy to discover.
struct ExtractArgs {
    /// Raise log verbosity (-v for debug, -vv for trace).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory the bundles are written to.
    #[arg(long, env = "INGRATE_CERT_DIR", default_value = ingrate::consts::CERT_DIR)]
    out_dir: PathBuf,

    /// Secret records, one namespace/name@version per argument.
    records: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ExtractArgs::parse();
    tracing_subscriber::fmt()
        .with_max_level(match args.verbose {
            0 => tracing::level_filters::LevelFilter::INFO,
            1 => tracing::level_filters::LevelFilter::DEBUG,
            _ => tracing::level_filters::LevelFilter::TRACE,
        })
        .init();

    std::fs::create_dir_all(&args.out_dir)?;

    // The fallback comes first, unconditionally: the proxy must be able to
    // start with zero valid secrets.
    extract::write_fallback(&args.out_dir)?;

    let records: Vec<SecretVersionRecord> = args
        .records
        .iter()
        .filter_map(|raw| match raw.parse() {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(record = %raw, error = %err, "Skipping malformed secret record");
                None
            }
        })
        .collect();

    if records.is_empty() {
        info!("No secret records to extract");
        return Ok(());
    }

    let client = match Client::try_default().await {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "Control plane unreachable, serving fallback certificate only");
            return Ok(());
        }
    };

    match tokio::time::timeout(
        OVERALL_DEADLINE,
        extract::extract_all(&client, &args.out_dir, &records),
    )
    .await
    {
        Ok(written) => {
            info!(
                written = written,
                requested = records.len(),
                "Certificate extraction finished"
            );
        }
        Err(_) => {
            warn!(
                deadline_secs = OVERALL_DEADLINE.as_secs(),
                "Extraction deadline elapsed, proxy starts with the bundles written so far"
            );
        }
    }

    Ok(())
}
