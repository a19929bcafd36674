// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

const CONFIG_ENV: &str = "MEDIA_MONITOR_CONFIG";
const APP_DIR: &str = "media-monitor";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between service health checks
    pub health_check_interval_secs: u64,
    pub log_level: LoggingLevel,
    pub log_to_disk: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 60,
            log_level: LoggingLevel::Info,
            log_to_disk: true,
        }
    }
}

impl MonitorConfig {
    /// Load from the default location, falling back to defaults when no
    /// config file exists.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| MonitorError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self> {
        toml::from_str(raw).map_err(|source| MonitorError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }
}

/// `$MEDIA_MONITOR_CONFIG`, else `$XDG_CONFIG_HOME/media-monitor/config.toml`,
/// else `~/.config/media-monitor/config.toml`.
pub fn config_path() -> PathBuf {
    if let Some(file) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(file);
    }

    if let Some(xdg_config) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config).join(APP_DIR).join(CONFIG_FILE);
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE)
}
