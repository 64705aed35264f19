use tracing::level_filters::LevelFilter;

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
/// Ingress-to-HAProxy controller.
///
/// Compiles the cluster's Ingress, Service, and Secret resources into an
/// HAProxy configuration and a proxy Deployment in the watch namespace.
pub struct IngrateArgs {
    /// Raise log verbosity (-v for debug, -vv for trace).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only consider ingresses matching this label selector.
    #[arg(
        short = 'l',
        long = "selector",
        env = "INGRATE_SELECTOR",
        default_value = ""
    )]
    pub selector: String,

    /// Namespace the proxy ConfigMap and Deployment are managed in.
    pub namespace: String,

    /// Name of the managed proxy instance.
    pub instance: String,
}

impl IngrateArgs {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    pub fn selector(&self) -> Option<&str> {
        if self.selector.is_empty() {
            None
        } else {
            Some(&self.selector)
        }
    }
}
