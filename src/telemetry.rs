use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber.
///
/// Honors `RUST_LOG` (default `info`) and writes to stderr, leaving stdout for CSV output.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
