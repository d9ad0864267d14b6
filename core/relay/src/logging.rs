//! Logging setup: console output plus a daily rolling file under the local
//! data directory.

use fs_err as fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "flrp-relay.log";
const KEEP_LOG_DAYS: u64 = 7;
pub const DEBUG_LOG_ENV: &str = "FLRP_DEBUG_LOG";

fn debug_requested(debug: bool) -> bool {
    debug
        || std::env::var(DEBUG_LOG_ENV)
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
            .unwrap_or(false)
}

fn env_filter(debug: bool) -> EnvFilter {
    if debug_requested(debug) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Console-only logging for one-shot subcommands. Logs go to stderr so
/// stdout stays machine-readable.
pub fn init_console(debug: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(debug))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Console plus file logging for the long-running relay. The returned guard
/// must live until exit or buffered lines are lost.
pub fn init(debug: bool) -> Option<WorkerGuard> {
    let Some(log_dir) = log_directory() else {
        init_console(debug);
        tracing::warn!("Log directory unavailable; logging to console only");
        return None;
    };

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter(debug))
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!(path = %log_dir.display(), "Logging initialized");
    cleanup_old_logs(&log_dir, KEEP_LOG_DAYS);

    Some(guard)
}

fn log_directory() -> Option<PathBuf> {
    let log_dir = dirs::data_local_dir()?.join("flrp").join("logs");
    match fs::create_dir_all(&log_dir) {
        Ok(()) => Some(log_dir),
        Err(err) => {
            eprintln!("Warning: failed to create log directory: {err}");
            None
        }
    }
}

fn cleanup_old_logs(log_dir: &Path, keep_days: u64) {
    let Some(cutoff) =
        SystemTime::now().checked_sub(Duration::from_secs(keep_days * 24 * 60 * 60))
    else {
        return;
    };

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read log directory for cleanup");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_rotated = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX) && name != LOG_FILE_PREFIX);
        if !is_rotated {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|meta| meta.modified()) else {
            continue;
        };
        if modified < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed old log file"),
                Err(err) => tracing::warn!(error = %err, "Failed to remove old log file"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cleanup_keeps_recent_and_unrelated_files() {
        let dir = TempDir::new().unwrap();
        let recent = dir.path().join(format!("{LOG_FILE_PREFIX}.2026-10-17"));
        let unrelated = dir.path().join("notes.txt");
        std::fs::write(&recent, "x").unwrap();
        std::fs::write(&unrelated, "x").unwrap();

        cleanup_old_logs(dir.path(), KEEP_LOG_DAYS);

        assert!(recent.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn cleanup_with_zero_retention_removes_rotated_logs() {
        let dir = TempDir::new().unwrap();
        let rotated = dir.path().join(format!("{LOG_FILE_PREFIX}.2020-01-01"));
        std::fs::write(&rotated, "x").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        cleanup_old_logs(dir.path(), 0);

        assert!(!rotated.exists());
    }
}
