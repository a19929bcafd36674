// SPDX-License-Identifier: GPL-3.0-only

//! Log output for the monitor: stdout plus an optional daily rolling file.
//!
//! The level lives in a reloadable [`EnvFilter`], so it can be changed at
//! runtime with [`set_log_level`] (the monitor does this for
//! [`MonitorCommand::SetLogLevel`](crate::MonitorCommand::SetLogLevel)).

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

use crate::config::{LoggingLevel, MonitorConfig};

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "media-monitor.log";
const KEEP_LOGS_FOR: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level until [`set_log_level`] is
/// called. A second call leaves the first subscriber in place.
pub fn init(config: &MonitorConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(config.log_level));
    let (filter, handle) = reload::Layer::new(filter);

    let (writer, guard) = if config.log_to_disk {
        match file_writer() {
            Ok((writer, guard)) => (Some(writer), Some(guard)),
            Err(e) => {
                eprintln!("media-monitor: file logging disabled: {e:#}");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
        }))
        .try_init();

    if installed.is_ok() {
        let _ = FILTER.set(handle);
        if let Some(guard) = guard {
            let _ = LOG_GUARD.set(guard);
        }
    }
}

/// Swap the active filter for one at `level`.
pub fn set_log_level(level: LoggingLevel) -> anyhow::Result<()> {
    let handle = FILTER.get().context("logging is not initialized")?;
    handle
        .reload(level_filter(level))
        .context("reloading log filter")?;
    Ok(())
}

fn level_filter(level: LoggingLevel) -> EnvFilter {
    // zbus logs every message below warn.
    let zbus = match level {
        LoggingLevel::Error => "error",
        _ => "warn",
    };
    EnvFilter::new(format!("{},zbus={zbus}", level.as_directive()))
}

fn file_writer() -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let (dir, prefix) = log_location();
    fs::create_dir_all(&dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    cleanup_old_logs(&dir, &prefix, SystemTime::now());

    Ok(tracing_appender::non_blocking(
        tracing_appender::rolling::daily(&dir, &prefix),
    ))
}

/// `$MEDIA_MONITOR_LOG_FILE`, else `$MEDIA_MONITOR_LOG_DIR`, else the XDG
/// state directory.
fn log_location() -> (PathBuf, OsString) {
    if let Some(file) = std::env::var_os("MEDIA_MONITOR_LOG_FILE").map(PathBuf::from)
        && let (Some(dir), Some(name)) = (file.parent(), file.file_name())
    {
        return (dir.to_path_buf(), name.to_os_string());
    }

    let dir = std::env::var_os("MEDIA_MONITOR_LOG_DIR")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("XDG_STATE_HOME").map(|d| PathBuf::from(d).join("media-monitor/logs")))
        .or_else(|| {
            std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/state/media-monitor/logs"))
        })
        .unwrap_or_else(|| PathBuf::from("/tmp/media-monitor/logs"));

    (dir, OsString::from(LOG_FILE_PREFIX))
}

/// Delete rolled files of ours last written before the retention window.
fn cleanup_old_logs(dir: &Path, prefix: &OsString, now: SystemTime) {
    let Some(cutoff) = now.checked_sub(KEEP_LOGS_FOR) else {
        return;
    };
    let prefix = prefix.to_string_lossy();
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    let expired = entries.flatten().filter(|entry| {
        let ours = entry.file_name().to_string_lossy().starts_with(prefix.as_ref());
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .is_ok_and(|modified| modified < cutoff);
        ours && is_file && stale
    });

    for entry in expired {
        let _ = fs::remove_file(entry.path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("media-monitor-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn level_filter_keeps_zbus_quiet() {
        let filter = level_filter(LoggingLevel::Trace).to_string();
        assert!(filter.contains("trace"));
        assert!(filter.contains("zbus=warn"));

        let filter = level_filter(LoggingLevel::Error).to_string();
        assert!(filter.contains("zbus=error"));
    }

    #[test]
    fn level_switch_needs_an_installed_subscriber() {
        assert!(set_log_level(LoggingLevel::Debug).is_err());
    }

    #[test]
    fn cleanup_removes_only_our_expired_files() {
        let dir = scratch_dir("logs");
        let ours = dir.join("media-monitor.log.2026-10-19");
        let foreign = dir.join("other.log");
        fs::write(&ours, "x").unwrap();
        fs::write(&foreign, "y").unwrap();

        cleanup_old_logs(&dir, &OsString::from(LOG_FILE_PREFIX), SystemTime::now());
        assert!(ours.exists());

        let later = SystemTime::now() + KEEP_LOGS_FOR + Duration::from_secs(60);
        cleanup_old_logs(&dir, &OsString::from(LOG_FILE_PREFIX), later);
        assert!(!ours.exists());
        assert!(foreign.exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
