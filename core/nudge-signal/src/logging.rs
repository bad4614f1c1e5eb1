//! File logging for the `nudge` CLI.
//!
//! Stdout is reserved for command output, so diagnostics go to a daily
//! rolling file under `~/.nudge/logs`. Logging is skipped silently when the
//! directory cannot be created.

use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const DEBUG_ENV: &str = "NUDGE_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "nudge.log";

/// Installs the file subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered lines are lost.
pub fn init() -> Option<WorkerGuard> {
    let log_dir = nudge_core::nudge_dir().ok()?.join("logs");
    fs_err::create_dir_all(&log_dir).ok()?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = if debug_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init()
        .ok()?;

    Some(guard)
}

fn debug_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}
