//! Device snapshot model
//!
//! [`DeviceInfo`] is the value a UI collaborator sees for a tracked block
//! device. It is a copy of the monitor's cached attributes at the time it
//! was taken and may be stale by the time it is rendered.

use serde::{Deserialize, Serialize};

/// Root of the device-management service's object namespace.
pub const SERVICE_ROOT_PATH: &str = "/org/freedesktop/UDisks2";

/// Whether `path` names a transient job object rather than a device.
///
/// Jobs live under `<service root>/jobs`.
pub fn is_job_path(path: &str) -> bool {
    path.strip_prefix(SERVICE_ROOT_PATH)
        .and_then(|rest| rest.strip_prefix("/jobs"))
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Snapshot of one tracked block device
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    // === Identity ===
    /// Bus object path, unique within the registry
    pub path: String,

    /// Human readable drive name (vendor and model)
    pub name: String,

    /// Short device-node name, e.g. "sdb1"
    pub dev: String,

    /// Object path of the owning drive
    pub drive: String,

    // === Filesystem ===
    /// Current mount point, empty when not mounted
    pub mountpoint: String,

    /// Filesystem type label, e.g. "vfat"
    pub filesystem: String,

    // === Media ===
    pub is_optical: bool,
    pub is_removable: bool,
    pub has_media: bool,
    pub optical_data_tracks: u32,
    pub optical_audio_tracks: u32,
    pub is_blank_disc: bool,
    pub has_partition: bool,
}

impl DeviceInfo {
    /// Empty snapshot for `path`, with the device-node name derived from it.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let dev = device_node_name(&path);
        Self {
            path,
            dev,
            ..Default::default()
        }
    }

    pub fn is_mounted(&self) -> bool {
        !self.mountpoint.is_empty()
    }
}

/// Last segment of an object path ("/org/.../block_devices/sdb1" -> "sdb1").
pub fn device_node_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_paths_are_detected_by_prefix() {
        assert!(is_job_path("/org/freedesktop/UDisks2/jobs/42"));
        assert!(!is_job_path("/org/freedesktop/UDisks2/block_devices/sdb1"));
        assert!(!is_job_path("/org/freedesktop/UDisks2/drives/Kingston"));
        assert!(!is_job_path("/org/freedesktop/UDisks2/jobsfoo"));
        assert!(!is_job_path("/com/example/jobs/1"));
    }

    #[test]
    fn new_derives_device_node_name() {
        let info = DeviceInfo::new("/org/freedesktop/UDisks2/block_devices/sr0");
        assert_eq!(info.dev, "sr0");
        assert!(!info.is_mounted());
        assert!(info.name.is_empty());
    }

    #[test]
    fn device_info_serialization() {
        let info = DeviceInfo {
            name: "Kingston DataTraveler".to_string(),
            drive: "/org/freedesktop/UDisks2/drives/Kingston_DataTraveler".to_string(),
            mountpoint: "/run/media/user/STICK".to_string(),
            filesystem: "vfat".to_string(),
            is_removable: true,
            has_media: true,
            has_partition: true,
            ..DeviceInfo::new("/org/freedesktop/UDisks2/block_devices/sdb1")
        };

        let json = serde_json::to_string(&info).unwrap();
        let deserialized: DeviceInfo = serde_json::from_str(&json).unwrap();

        assert_eq!(info, deserialized);
        assert!(deserialized.is_mounted());
    }
}
