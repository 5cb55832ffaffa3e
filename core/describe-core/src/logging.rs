//! File logging for the embedded library.
//!
//! The host process owns stdout/stderr, so logs go to a daily-rolling file.
//! `RUST_LOG` controls the filter; `KUBEDESCRIBE_DEBUG_LOG=1` forces `debug`.

use once_cell::sync::OnceCell;
use std::env;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "KUBEDESCRIBE_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "kubedescribe.log";

// Keeps the background writer alive for the life of the process.
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Installs the global subscriber writing under `log_dir`. Later calls are no-ops.
pub fn init(log_dir: &Path) -> Result<(), String> {
    LOG_GUARD
        .get_or_try_init(|| {
            fs_err::create_dir_all(log_dir)
                .map_err(|err| format!("Failed to create log dir: {}", err))?;
            let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|err| format!("Failed to install log subscriber: {}", err))?;
            Ok(guard)
        })
        .map(|_| ())
}

pub fn is_initialized() -> bool {
    LOG_GUARD.get().is_some()
}

fn env_filter() -> EnvFilter {
    if debug_enabled(env::var(DEBUG_ENV).ok().as_deref()) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn debug_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}
