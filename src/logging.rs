//! Diagnostic tracing for the bridge.
//!
//! Diagnostics go to stderr (filtered by `RUST_LOG`, default `warn`) and,
//! when the log directory is usable, to a daily-rolling `bridge.log`.
//!
//! Product artifacts (ledger, audit trail, handoff slot) are written by
//! their own modules and never depend on these filters.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing. Keep the returned guard alive for the whole process so
/// buffered file output is flushed on exit.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_filter = if verbose { "warn,bridge=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).compact();

    let file_parts = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        let appender = tracing_appender::rolling::daily(dir, "bridge.log");
        Some(tracing_appender::non_blocking(appender))
    });

    match file_parts {
        Some((writer, guard)) => {
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init();
            None
        }
    }
}
