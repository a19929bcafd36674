// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

/// Error types for the monitor and its configuration
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Config I/O error for {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Monitor has stopped")]
    Closed,
}

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;
