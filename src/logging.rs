use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber for binaries and tests. Respects
/// `RUST_LOG`; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
