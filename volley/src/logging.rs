use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "warn,volley=info,volley_core=info";

/// Logs go to stderr so `--output json` keeps stdout machine-readable.
pub(crate) fn init() {
    let env_filter = EnvFilter::try_from_env("VOLLEY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
