use tracing_subscriber::EnvFilter;

/// Install the global subscriber; `RUST_LOG` wins over `level`
///
/// Logs go to stderr so they never mix with prompts on stdout.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
