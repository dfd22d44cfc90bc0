//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! Two modes:
//! - **Production** ([`init_production`]): JSON layer (daily file or stdout) + console layer
//! - **CLI** ([`init_cli`]): console-only for one-shot subcommands and marble workloads

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Base name of rotated log files.
pub const LOG_FILE_PREFIX: &str = "marblemesh.log";

/// Keeps the non-blocking JSON writer alive.
///
/// Dropping it flushes pending log entries, so hold it until the process
/// is about to exit.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// JSON writer: daily-rotated file under `logs_dir`, or stdout.
fn json_writer(logs_dir: Option<&Path>) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let Some(logs_dir) = logs_dir else {
        return Ok(tracing_appender::non_blocking(std::io::stdout()));
    };
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;
    Ok(tracing_appender::non_blocking(
        tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX),
    ))
}

/// Initialise logging for the webhook server.
///
/// JSON records go to `{logs_dir}/marblemesh.log.YYYY-MM-DD` when a
/// directory is given and to stdout otherwise. A human-readable copy always
/// goes to stderr. `RUST_LOG` controls filtering (default: `info`).
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init_production(logs_dir: Option<&Path>) -> anyhow::Result<LoggingGuard> {
    let (writer, guard) = json_writer(logs_dir)?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(LoggingGuard { _guard: guard })
}

/// Initialise stderr-only logging. Does nothing if a subscriber is already
/// installed.
pub fn init_cli() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}
