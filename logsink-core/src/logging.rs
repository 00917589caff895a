//! Diagnostics for the sink itself, via **tracing**.
//!
//! The sink never writes its own failures into the files it manages. Swallowed
//! rotation, retention and store failures are reported here instead, so a host
//! that installs a subscriber can see them.

use tracing::{error, warn};

/// Initializes the global tracing subscriber.
///
/// Call once at process start. Output is JSON on stderr, filtered by `RUST_LOG`
/// (e.g. `RUST_LOG=logsink_core=debug`).
pub fn init_structured_logging() {
    tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_level(true)
        .with_target(true)
        .with_current_span(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

/// Reports a best-effort step that failed and was skipped.
pub fn log_swallowed(step: &str, detail: &str) {
    warn!(step = %step, detail = %detail, "best-effort step failed");
}

/// Reports a failed append to a destination file.
pub fn log_write_failure(path: &str, detail: &str) {
    error!(path = %path, detail = %detail, "log append failed");
}
