//! Logging setup
//!
//! `tracing` subscriber for the binaries: stdout always, plus an optional
//! non-blocking log file. `RUST_LOG` overrides the default filter.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,vaultkv=debug";

/// Install the global subscriber
///
/// With `log_file`, lines are also appended to that file through a
/// background writer; keep the returned guard alive until exit so buffered
/// lines are flushed. Installing twice is a no-op.
pub fn init(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stdout = fmt::layer().with_target(true).with_thread_ids(true);

    match log_file {
        None => {
            let _ = tracing_subscriber::registry().with(filter).with(stdout).try_init();
            None
        }
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("vaultkv.log");

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init();
            Some(guard)
        }
    }
}
