use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "HEALTHSYNC_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Logs go to stderr so command output on stdout stays machine-readable.
pub(crate) fn init() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
