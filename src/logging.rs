// 📜 Logging - tracing subscriber setup for the CLI
// Diagnostics go to stderr so the catalog can be written to stdout-like targets.

use tracing_subscriber::{fmt, EnvFilter};

/// Default filter directive for a `-v` count
pub fn level_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "price_catalog=info",
        1 => "price_catalog=debug",
        _ => "price_catalog=trace",
    }
}

/// Install the global subscriber; `RUST_LOG` wins over the verbosity flag
pub fn init(verbosity: u8) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_directive(verbosity)));

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
