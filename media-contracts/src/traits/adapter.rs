// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use crate::MediaError;

/// Request/query operations against the device-management service.
///
/// Block-level queries take a device path; drive-level queries take the
/// drive path returned by [`ServiceAdapter::drive_path`]. Implementations
/// hold no per-device state.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// Object paths of every block device the service currently knows.
    async fn enumerate_device_paths(&self) -> Result<Vec<String>, MediaError>;

    async fn drive_path(&self, device_path: &str) -> Result<String, MediaError>;

    async fn device_name(&self, drive_path: &str) -> Result<String, MediaError>;

    async fn is_removable(&self, drive_path: &str) -> Result<bool, MediaError>;

    /// First mount point of the device, empty when unmounted.
    async fn mount_point(&self, device_path: &str) -> Result<String, MediaError>;

    async fn filesystem(&self, device_path: &str) -> Result<String, MediaError>;

    async fn is_optical(&self, drive_path: &str) -> Result<bool, MediaError>;

    async fn has_media(&self, drive_path: &str) -> Result<bool, MediaError>;

    async fn optical_data_tracks(&self, drive_path: &str) -> Result<u32, MediaError>;

    async fn optical_audio_tracks(&self, drive_path: &str) -> Result<u32, MediaError>;

    async fn is_blank_optical(&self, drive_path: &str) -> Result<bool, MediaError>;

    async fn has_partition(&self, device_path: &str) -> Result<bool, MediaError>;

    async fn mount(&self, device_path: &str) -> Result<(), MediaError>;

    async fn unmount(&self, device_path: &str) -> Result<(), MediaError>;

    async fn eject(&self, drive_path: &str) -> Result<(), MediaError>;
}
