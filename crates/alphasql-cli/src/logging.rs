//! Shared `tracing` subscriber setup for all three binaries.

/// Initializes a `tracing_subscriber::fmt` subscriber gated by `RUST_LOG`
/// (or `-v`/`-vv` verbosity), matching the corpus's CLI init pattern.
/// Failing to install a subscriber (e.g. one is already installed in a
/// test harness) is not fatal.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
