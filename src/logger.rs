//! Debug logging support for findx
//!
//! When debug mode is enabled via config, engine operations are logged to
//! `findx.log` inside the state directory (~/.findx/ unless overridden).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

pub const LOG_FILE_NAME: &str = "findx.log";

/// Keeps the background log writer alive; dropping it flushes pending lines
pub struct LoggingGuard {
    log_path: PathBuf,
    _worker: WorkerGuard,
}

impl LoggingGuard {
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Initialize the debug logging system
///
/// If `debug_enabled` is true, sets up file logging under `log_dir`.
/// Returns `None` if logging is not enabled or the log file cannot be created.
pub fn init_debug_logging(debug_enabled: bool, log_dir: &Path) -> Result<Option<LoggingGuard>> {
    if !debug_enabled {
        return Ok(None);
    }

    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let log_path = log_dir.join(LOG_FILE_NAME);
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()));

    match file {
        Ok(log_file) => {
            let (writer, worker) = tracing_appender::non_blocking(log_file);

            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("findx=info"));

            let subscriber = registry()
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .with(filter);

            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

            Ok(Some(LoggingGuard {
                log_path,
                _worker: worker,
            }))
        }
        Err(e) => {
            // Logging must never block the engine itself
            eprintln!("Warning: Could not create log file: {}", e);
            Ok(None)
        }
    }
}
