// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaErrorKind {
    NotFound,
    PermissionDenied,
    Unsupported,
    Busy,
    /// The system bus itself is unreachable
    Disconnected,
    /// The device-management service is not on the bus
    Unavailable,
    Failed,
}

/// Failure reported by the service adapter
///
/// `message` is the human readable text shown to the user. It may be empty
/// when the bus gave no reason, in which case callers synthesize their own.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct MediaError {
    pub kind: MediaErrorKind,
    pub message: String,
}

impl MediaError {
    pub fn new(kind: MediaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(MediaErrorKind::Failed, message)
    }

    pub fn disconnected() -> Self {
        Self::new(MediaErrorKind::Disconnected, "Not connected to the system bus")
    }

    /// The message, or `fallback` when the bus supplied none.
    pub fn message_or(&self, fallback: impl FnOnce() -> String) -> String {
        if self.message.trim().is_empty() {
            fallback()
        } else {
            self.message.clone()
        }
    }
}
