// SPDX-License-Identifier: GPL-3.0-only

//! Error types for UDisks2 calls and their translation into user-facing text

use media_contracts::{MediaError, MediaErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UdisksError {
    #[error("Not connected to the system bus")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("D-Bus error: {0}")]
    DBusError(String),

    #[error(transparent)]
    Zbus(#[from] zbus::Error),

    #[error(transparent)]
    Udisks(#[from] udisks2::Error),
}

impl UdisksError {
    /// The bus-level error underneath, if any.
    pub(crate) fn zbus(&self) -> Option<&zbus::Error> {
        match self {
            Self::Zbus(e) | Self::Udisks(udisks2::Error::Zbus(e)) => Some(e),
            _ => None,
        }
    }

    /// Whether the transport itself went away and must be re-established.
    pub fn is_transport_lost(&self) -> bool {
        matches!(self, Self::NotConnected)
            || matches!(self.zbus(), Some(zbus::Error::InputOutput(_)))
    }

    /// D-Bus error description without the error-name prefix.
    fn description(&self) -> String {
        match self.zbus() {
            Some(zbus::Error::MethodError(name, detail, _)) => detail
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| name.to_string()),
            _ => self.to_string(),
        }
    }
}

const BUSY: &str = "Device is busy. Close any applications using it and try again.";
const NOT_AUTHORIZED: &str = "Not authorized to perform this operation";
const NOT_SUPPORTED: &str = "Not supported by this drive";

fn is_not_supported(msg: &str) -> bool {
    msg.contains("NotSupported")
        || msg.contains("not supported")
        || msg.contains("No such interface")
}

fn is_device_busy(msg: &str) -> bool {
    msg.contains("DeviceBusy") || msg.contains("Device or resource busy")
}

fn is_not_authorized(msg: &str) -> bool {
    msg.contains("NotAuthorized") || msg.contains("not authorized")
}

fn is_service_missing(msg: &str) -> bool {
    msg.contains("ServiceUnknown") || msg.contains("NameHasNoOwner")
}

impl From<UdisksError> for MediaError {
    fn from(error: UdisksError) -> Self {
        if error.is_transport_lost() {
            return MediaError::new(MediaErrorKind::Disconnected, error.to_string());
        }

        match &error {
            UdisksError::Udisks(udisks2::Error::DeviceBusy) => {
                return MediaError::new(MediaErrorKind::Busy, BUSY);
            }
            UdisksError::Udisks(
                udisks2::Error::NotAuthorized
                | udisks2::Error::NotAuthorizedCanObtain
                | udisks2::Error::NotAuthorizedDismissed,
            ) => return MediaError::new(MediaErrorKind::PermissionDenied, NOT_AUTHORIZED),
            UdisksError::Udisks(udisks2::Error::NotSupported) => {
                return MediaError::new(MediaErrorKind::Unsupported, NOT_SUPPORTED);
            }
            _ => {}
        }

        // Match on the full text so the error name is visible as well.
        let full = match error.zbus() {
            Some(zbus::Error::MethodError(name, detail, _)) => {
                format!("{name}: {}", detail.as_deref().unwrap_or_default())
            }
            _ => error.to_string(),
        };

        if is_service_missing(&full) {
            MediaError::new(
                MediaErrorKind::Unavailable,
                "The disk management service is not running",
            )
        } else if is_device_busy(&full) {
            MediaError::new(MediaErrorKind::Busy, BUSY)
        } else if is_not_authorized(&full) {
            MediaError::new(MediaErrorKind::PermissionDenied, NOT_AUTHORIZED)
        } else if is_not_supported(&full) {
            MediaError::new(MediaErrorKind::Unsupported, NOT_SUPPORTED)
        } else {
            MediaError::failed(error.description())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_maps_to_disconnected() {
        let error: MediaError = UdisksError::NotConnected.into();
        assert_eq!(error.kind, MediaErrorKind::Disconnected);
        assert!(UdisksError::NotConnected.is_transport_lost());
    }

    #[test]
    fn busy_and_unsupported_are_translated() {
        let error: MediaError =
            UdisksError::DBusError("org.freedesktop.UDisks2.Error.DeviceBusy".to_string()).into();
        assert_eq!(error.kind, MediaErrorKind::Busy);

        let error: MediaError =
            UdisksError::DBusError("No such interface 'org.freedesktop.UDisks2.Filesystem'".to_string())
                .into();
        assert_eq!(error.kind, MediaErrorKind::Unsupported);
        assert_eq!(error.message, "Not supported by this drive");
    }

    #[test]
    fn udisks_errors_are_classified() {
        let error: MediaError = UdisksError::from(udisks2::Error::DeviceBusy).into();
        assert_eq!(error.kind, MediaErrorKind::Busy);

        let error: MediaError = UdisksError::from(udisks2::Error::NotAuthorizedDismissed).into();
        assert_eq!(error.kind, MediaErrorKind::PermissionDenied);

        let error: MediaError = UdisksError::from(udisks2::Error::NotMounted).into();
        assert_eq!(error.kind, MediaErrorKind::Failed);
        assert_eq!(error.message, "The device is not mounted.");
    }

    #[test]
    fn udisks_io_failure_counts_as_transport_loss() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "socket closed");
        let error = UdisksError::from(udisks2::Error::Zbus(zbus::Error::InputOutput(
            std::sync::Arc::new(io),
        )));
        assert!(error.is_transport_lost());
        assert!(error.zbus().is_some());

        let error: MediaError = error.into();
        assert_eq!(error.kind, MediaErrorKind::Disconnected);
    }

    #[test]
    fn other_failures_keep_their_text() {
        let error: MediaError = UdisksError::InvalidPath("bogus".to_string()).into();
        assert_eq!(error.kind, MediaErrorKind::Failed);
        assert_eq!(error.message, "Invalid path: bogus");
    }
}
