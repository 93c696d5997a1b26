use tracing_subscriber::EnvFilter;

/// Variable holding the log filter, e.g. `TONEARM_LOG=tonearm=debug`.
pub const LOG_ENV: &str = "TONEARM_LOG";

/// Install the global subscriber, writing to stderr. Defaults to `info`.
///
/// Calling it twice is harmless; the second subscriber is ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
