use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Engine `log` records are forwarded to it.
///
/// Reads `RUST_LOG`; falls back to `default_level`. Output goes to stderr so
/// `--json` stdout stays machine-readable.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
