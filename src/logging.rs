use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn resolve_filter(verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_env("RESEED_LOG") {
        return filter;
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(DEFAULT_FILTER)
    }
}

/// Install the global stderr subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(resolve_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
