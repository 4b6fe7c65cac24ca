//! Diagnostic tracing for autocoder.
//!
//! Tracing output is for debugging and goes to stderr, filtered by
//! `RUST_LOG`. User-facing status lines are printed by the CLI on stdout and
//! do not depend on the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` if unset. Compact format on stderr.
///
/// # Example
/// ```bash
/// RUST_LOG=autocoder=debug autocoder fix --dir ./demo
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
