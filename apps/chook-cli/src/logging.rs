//! Logging initialization and log file management.
//!
//! Human-readable output always goes to stderr. Commands that talk to the
//! generation service also write a JSON log to
//! `<log_root>/logs/<command>/<YYYYMMDD_HHMMSS>.log`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Maximum age of log files before cleanup, in days.
const LOG_RETENTION_DAYS: u64 = 3;

/// Directive used for the file layer when `RUST_LOG` is unset.
const DEFAULT_FILE_DIRECTIVE: &str = "chook_core=debug,chook_cli=debug,warn";

/// Initialize the global tracing subscriber.
///
/// When `command` is `Some`, a JSON file layer is added under
/// `<log_root>/logs/<command>/`. The returned guard must be held until
/// exit so buffered lines are flushed.
///
/// # Errors
///
/// Returns an error if the log directory or file cannot be created.
pub fn init_tracing(log_root: &Path, command: Option<&str>) -> Result<Option<WorkerGuard>> {
    let Some(command) = command else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(EnvFilter::from_default_env())
            .init();
        return Ok(None);
    };

    let (writer, guard) = open_log_writer(log_root, command, Utc::now())?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(file_filter()),
        )
        .init();
    Ok(Some(guard))
}

fn file_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILE_DIRECTIVE))
}

/// Create the log directory and file, returning a non-blocking writer and guard.
fn open_log_writer(
    log_root: &Path,
    command: &str,
    now: DateTime<Utc>,
) -> Result<(NonBlocking, WorkerGuard)> {
    let log_path = build_log_path(log_root, command, now);
    let log_dir = log_path.parent().context(format!(
        "failed to resolve parent directory for log path: {}",
        log_path.display(),
    ))?;

    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;
    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(log_file))
}

/// `<log_root>/logs/<command>/<YYYYMMDD_HHMMSS>.log`
fn build_log_path(log_root: &Path, command: &str, now: DateTime<Utc>) -> PathBuf {
    log_root
        .join("logs")
        .join(command)
        .join(format!("{}.log", now.format("%Y%m%d_%H%M%S")))
}

/// Remove `.log` files older than three days from `<log_root>/logs/`,
/// then any directories left empty.
///
/// Best-effort: failures are reported with `eprintln!` because tracing is
/// not initialized yet.
pub fn cleanup_old_logs(log_root: &Path) {
    let logs_dir = log_root.join("logs");
    if !logs_dir.is_dir() {
        return;
    }

    let cutoff = SystemTime::now() - Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
    remove_old_log_files(&logs_dir, cutoff);
    remove_empty_dirs(&logs_dir);
}

fn remove_old_log_files(dir: &Path, cutoff: SystemTime) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("warning: failed to read log directory {}: {e}", dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_old_log_files(&path, cutoff);
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("warning: failed to read metadata for {}: {e}", path.display());
                continue;
            }
        };
        if modified < cutoff
            && let Err(e) = fs::remove_file(&path)
        {
            eprintln!("warning: failed to remove old log file {}: {e}", path.display());
        }
    }
}

/// Remove empty subdirectories under `dir`, keeping `dir` itself.
fn remove_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|e| e.path()) {
        if path.is_dir() {
            remove_empty_dirs(&path);
            // Fails while the directory still has files.
            fs::remove_dir(&path).ok();
        }
    }
}
