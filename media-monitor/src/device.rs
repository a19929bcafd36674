// SPDX-License-Identifier: GPL-3.0-only

//! Per-device state object
//!
//! A [`Device`] caches the attributes of one block device and keeps them in
//! step with the service. Change detection covers media presence, mount
//! point and name; every other attribute is refreshed silently.

use std::sync::Arc;

use futures::StreamExt;
use media_contracts::{DeviceBus, MediaError, ServiceAdapter};
use media_types::{BusSignal, DeviceEvent, DeviceInfo, device_node_name};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct Device {
    info: DeviceInfo,
    adapter: Arc<dyn ServiceAdapter>,
    bus: Arc<dyn DeviceBus>,
    events: UnboundedSender<DeviceEvent>,
    watch: Option<JoinHandle<()>>,
}

fn value_or_default<T: Default>(result: Result<T, MediaError>, what: &str, path: &str) -> T {
    result.unwrap_or_else(|e| {
        debug!("Could not read {what} for {path}: {e}");
        T::default()
    })
}

impl Device {
    /// Start tracking `path`.
    ///
    /// Property-change notifications for the path are forwarded to
    /// `signals`. Attributes are loaded right away; this first load never
    /// emits change events. An invalid device keeps default attributes.
    pub async fn new(
        path: impl Into<String>,
        adapter: Arc<dyn ServiceAdapter>,
        bus: Arc<dyn DeviceBus>,
        events: UnboundedSender<DeviceEvent>,
        signals: UnboundedSender<BusSignal>,
    ) -> Self {
        let mut device = Self {
            info: DeviceInfo::new(path),
            adapter,
            bus,
            events,
            watch: None,
        };

        device.watch = device.watch_properties(signals).await;
        if let Some(info) = device.fetch().await {
            device.info = info;
        }
        device
    }

    async fn watch_properties(&self, signals: UnboundedSender<BusSignal>) -> Option<JoinHandle<()>> {
        let mut stream = match self.bus.property_signals(&self.info.path).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("No property notifications for {}: {e}", self.info.path);
                return None;
            }
        };

        Some(tokio::spawn(async move {
            while let Some(signal) = stream.next().await {
                if signals.send(signal).is_err() {
                    break;
                }
            }
        }))
    }

    /// Drop the current property subscription and open a new one.
    ///
    /// Needed once the transport is re-established: the old stream belonged
    /// to the dead connection and will never deliver again.
    pub async fn resubscribe(&mut self, signals: UnboundedSender<BusSignal>) {
        if let Some(previous) = self.watch.take() {
            previous.abort();
        }
        self.watch = self.watch_properties(signals).await;
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn path(&self) -> &str {
        &self.info.path
    }

    async fn is_valid(&self) -> bool {
        self.bus.is_device_valid(&self.info.path).await
    }

    /// Read every attribute from the service, or `None` if the device's
    /// bus interface is not valid.
    async fn fetch(&self) -> Option<DeviceInfo> {
        if !self.is_valid().await {
            return None;
        }

        let path = self.info.path.as_str();
        let adapter = self.adapter.as_ref();

        let drive = value_or_default(adapter.drive_path(path).await, "drive", path);
        let drive_ref = drive.as_str();

        Some(DeviceInfo {
            path: path.to_string(),
            name: value_or_default(adapter.device_name(drive_ref).await, "name", path),
            dev: device_node_name(path),
            is_removable: value_or_default(adapter.is_removable(drive_ref).await, "removable", path),
            mountpoint: value_or_default(adapter.mount_point(path).await, "mount point", path),
            filesystem: value_or_default(adapter.filesystem(path).await, "filesystem", path),
            is_optical: value_or_default(adapter.is_optical(drive_ref).await, "optical", path),
            has_media: value_or_default(adapter.has_media(drive_ref).await, "media", path),
            optical_data_tracks: value_or_default(
                adapter.optical_data_tracks(drive_ref).await,
                "data tracks",
                path,
            ),
            optical_audio_tracks: value_or_default(
                adapter.optical_audio_tracks(drive_ref).await,
                "audio tracks",
                path,
            ),
            is_blank_disc: value_or_default(adapter.is_blank_optical(drive_ref).await, "blank", path),
            has_partition: value_or_default(adapter.has_partition(path).await, "partition", path),
            drive,
        })
    }

    /// Re-read every attribute and emit events for tracked changes.
    pub async fn refresh(&mut self) {
        let Some(next) = self.fetch().await else {
            return;
        };
        let previous = std::mem::replace(&mut self.info, next);
        let path = self.info.path.clone();

        if previous.has_media != self.info.has_media {
            self.emit(DeviceEvent::MediaChanged {
                path: path.clone(),
                present: self.info.has_media,
            });
        }
        if previous.mountpoint != self.info.mountpoint {
            self.emit(DeviceEvent::MountpointChanged {
                path: path.clone(),
                mountpoint: self.info.mountpoint.clone(),
            });
        }
        if previous.name != self.info.name {
            self.emit(DeviceEvent::NameChanged {
                path,
                name: self.info.name.clone(),
            });
        }
    }

    pub async fn mount(&mut self) {
        if !self.is_valid().await || self.info.is_mounted() {
            return;
        }

        if let Err(e) = self.adapter.mount(&self.info.path).await {
            warn!("Mount of {} failed: {e}", self.info.path);
            self.emit_error(e.message);
            return;
        }

        self.refresh().await;
    }

    pub async fn unmount(&mut self) {
        if !self.is_valid().await || !self.info.is_mounted() {
            return;
        }

        let result = self.adapter.unmount(&self.info.path).await;
        self.refresh().await;

        let failure = match result {
            Err(e) => Some(e.message_or(|| self.unmount_failed())),
            Ok(()) if self.info.is_mounted() => Some(self.unmount_failed()),
            Ok(()) => None,
        };
        if let Some(message) = failure {
            warn!("Unmount of {} failed: {message}", self.info.path);
            self.emit_error(message);
            return;
        }

        if self.info.is_optical {
            self.eject().await;
        }
    }

    pub async fn eject(&mut self) {
        if !self.is_valid().await {
            return;
        }

        let result = self.adapter.eject(&self.info.drive).await;
        self.refresh().await;

        if let Err(e) = result {
            let message = e.message_or(|| format!("Failed to eject {}", self.info.name));
            warn!("Eject of {} failed: {message}", self.info.drive);
            self.emit_error(message);
        }
    }

    fn unmount_failed(&self) -> String {
        format!("Failed to unmount {}", self.info.name)
    }

    fn emit_error(&self, message: String) {
        self.emit(DeviceEvent::Error {
            path: self.info.path.clone(),
            message,
        });
    }

    fn emit(&self, event: DeviceEvent) {
        // The registry owns the receiver; nobody to tell once it is gone.
        let _ = self.events.send(event);
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.abort();
        }
    }
}
