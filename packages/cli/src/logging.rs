// ABOUTME: Tracing subscriber setup for the CLI
// ABOUTME: Logs go to stderr so the interactive session on stdout stays clean

use sndbx_config::constants::{DEFAULT_LOG_FILTER, SNDBX_LOG};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `--verbose` wins over `SNDBX_LOG`.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(SNDBX_LOG).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
}
