/// Installs the global subscriber. `RUST_LOG` wins over the `-v` flag; logs go
/// to stderr so stdout stays clean for file URLs and tables.
pub fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}={level}", env!("CARGO_CRATE_NAME")).into());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
