//! Structured logging setup.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "resume_rag=info,resume_rag_core=info";

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` when set. Output goes to stderr so
/// command output on stdout stays clean.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // try_init: a second call (tests, embedded use) is a no-op.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
