// SPDX-License-Identifier: GPL-3.0-only

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use media_contracts::{DeviceBus, MediaError, MediaErrorKind, ServiceAdapter, SignalStream};
use media_types::{BusSignal, device_node_name};

/// Calls that change state or subscribe, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Enumerate,
    WatchObjects,
    WatchProperties(String),
    Mount(String),
    Unmount(String),
    Eject(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Mount,
    Unmount,
    Eject,
}

/// Service-side state of one block device
#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    pub drive: String,
    pub name: String,
    pub mountpoint: String,
    pub filesystem: String,
    pub optical: bool,
    pub removable: bool,
    pub media: bool,
    pub data_tracks: u32,
    pub audio_tracks: u32,
    pub blank: bool,
    pub partition: bool,
    /// Where a successful mount lands
    pub mount_target: String,
    /// A successful unmount leaves the device mounted
    pub sticky_mount: bool,
}

impl FakeDevice {
    /// Removable USB stick partition on its own drive
    pub fn usb(path: &str) -> Self {
        let dev = device_node_name(path);
        Self {
            drive: format!("/org/freedesktop/UDisks2/drives/{dev}"),
            name: format!("USB Stick {dev}"),
            filesystem: "vfat".to_string(),
            removable: true,
            media: true,
            partition: true,
            mount_target: format!("/media/{dev}"),
            ..Default::default()
        }
    }

    /// Optical drive with a data disc inserted
    pub fn optical(path: &str) -> Self {
        let dev = device_node_name(path);
        Self {
            drive: format!("/org/freedesktop/UDisks2/drives/{dev}"),
            name: format!("DVD Writer {dev}"),
            filesystem: "iso9660".to_string(),
            optical: true,
            removable: true,
            media: true,
            data_tracks: 1,
            mount_target: format!("/media/{dev}"),
            ..Default::default()
        }
    }

    pub fn mounted_at(mut self, mountpoint: &str) -> Self {
        self.mountpoint = mountpoint.to_string();
        self
    }
}

struct FakeState {
    devices: BTreeMap<String, FakeDevice>,
    connected: bool,
    connect_succeeds: bool,
    service_available: bool,
    invalid: HashSet<String>,
    enumerate_error: Option<MediaError>,
    results: HashMap<Op, MediaError>,
    calls: Vec<Call>,
    object_sender: Option<UnboundedSender<BusSignal>>,
    property_senders: HashMap<String, UnboundedSender<BusSignal>>,
}

/// In-memory [`ServiceAdapter`] + [`DeviceBus`].
///
/// Starts connected, with the service present and no devices.
pub struct FakeService {
    state: Mutex<FakeState>,
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                devices: BTreeMap::new(),
                connected: true,
                connect_succeeds: true,
                service_available: true,
                invalid: HashSet::new(),
                enumerate_error: None,
                results: HashMap::new(),
                calls: Vec::new(),
                object_sender: None,
                property_senders: HashMap::new(),
            }),
        }
    }
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, path: &str, device: FakeDevice) {
        self.state().devices.insert(path.to_string(), device);
    }

    pub fn remove(&self, path: &str) {
        self.state().devices.remove(path);
    }

    /// Change a device's service-side state in place.
    pub fn update(&self, path: &str, f: impl FnOnce(&mut FakeDevice)) {
        if let Some(device) = self.state().devices.get_mut(path) {
            f(device);
        }
    }

    /// Bring the transport up or down. Going down ends every subscription.
    pub fn set_connected(&self, connected: bool) {
        let mut state = self.state();
        state.connected = connected;
        if !connected {
            state.object_sender = None;
            state.property_senders.clear();
        }
    }

    pub fn set_connect_succeeds(&self, succeeds: bool) {
        self.state().connect_succeeds = succeeds;
    }

    pub fn set_service_available(&self, available: bool) {
        self.state().service_available = available;
    }

    /// Mark a device's bus interface invalid (or valid again).
    pub fn set_invalid(&self, path: &str, invalid: bool) {
        let mut state = self.state();
        if invalid {
            state.invalid.insert(path.to_string());
        } else {
            state.invalid.remove(path);
        }
    }

    pub fn set_enumerate_error(&self, error: Option<MediaError>) {
        self.state().enumerate_error = error;
    }

    /// Make every following `op` fail with `error`.
    pub fn fail(&self, op: Op, error: MediaError) {
        self.state().results.insert(op, error);
    }

    pub fn succeed(&self, op: Op) {
        self.state().results.remove(&op);
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.state().calls)
    }

    /// Deliver an object-manager notification to the current subscriber.
    pub fn emit_object(&self, signal: BusSignal) -> bool {
        self.state()
            .object_sender
            .as_ref()
            .is_some_and(|tx| tx.unbounded_send(signal).is_ok())
    }

    /// Deliver a PropertiesChanged notification for `path`.
    pub fn emit_properties_changed(&self, path: &str) -> bool {
        self.state()
            .property_senders
            .get(path)
            .is_some_and(|tx| {
                tx.unbounded_send(BusSignal::PropertiesChanged(path.to_string()))
                    .is_ok()
            })
    }

    /// Whether a property subscription for `path` is still being consumed.
    pub fn is_watching(&self, path: &str) -> bool {
        self.state()
            .property_senders
            .get(path)
            .is_some_and(|tx| !tx.is_closed())
    }

    fn check_connected(&self) -> Result<(), MediaError> {
        if self.state().connected {
            Ok(())
        } else {
            Err(MediaError::disconnected())
        }
    }

    fn with_device<T>(&self, path: &str, f: impl FnOnce(&FakeDevice) -> T) -> Result<T, MediaError> {
        self.check_connected()?;
        self.state()
            .devices
            .get(path)
            .map(f)
            .ok_or_else(|| MediaError::new(MediaErrorKind::NotFound, format!("no device {path}")))
    }

    fn with_drive<T>(&self, drive: &str, f: impl FnOnce(&FakeDevice) -> T) -> Result<T, MediaError> {
        self.check_connected()?;
        self.state()
            .devices
            .values()
            .find(|d| d.drive == drive)
            .map(f)
            .ok_or_else(|| MediaError::new(MediaErrorKind::NotFound, format!("no drive {drive}")))
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }

    fn scripted(&self, op: Op) -> Result<(), MediaError> {
        match self.state().results.get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ServiceAdapter for FakeService {
    async fn enumerate_device_paths(&self) -> Result<Vec<String>, MediaError> {
        self.record(Call::Enumerate);
        self.check_connected()?;
        let state = self.state();
        if let Some(error) = &state.enumerate_error {
            return Err(error.clone());
        }
        Ok(state.devices.keys().cloned().collect())
    }

    async fn drive_path(&self, device_path: &str) -> Result<String, MediaError> {
        self.with_device(device_path, |d| d.drive.clone())
    }

    async fn device_name(&self, drive_path: &str) -> Result<String, MediaError> {
        self.with_drive(drive_path, |d| d.name.clone())
    }

    async fn is_removable(&self, drive_path: &str) -> Result<bool, MediaError> {
        self.with_drive(drive_path, |d| d.removable)
    }

    async fn mount_point(&self, device_path: &str) -> Result<String, MediaError> {
        self.with_device(device_path, |d| d.mountpoint.clone())
    }

    async fn filesystem(&self, device_path: &str) -> Result<String, MediaError> {
        self.with_device(device_path, |d| d.filesystem.clone())
    }

    async fn is_optical(&self, drive_path: &str) -> Result<bool, MediaError> {
        self.with_drive(drive_path, |d| d.optical)
    }

    async fn has_media(&self, drive_path: &str) -> Result<bool, MediaError> {
        self.with_drive(drive_path, |d| d.media)
    }

    async fn optical_data_tracks(&self, drive_path: &str) -> Result<u32, MediaError> {
        self.with_drive(drive_path, |d| d.data_tracks)
    }

    async fn optical_audio_tracks(&self, drive_path: &str) -> Result<u32, MediaError> {
        self.with_drive(drive_path, |d| d.audio_tracks)
    }

    async fn is_blank_optical(&self, drive_path: &str) -> Result<bool, MediaError> {
        self.with_drive(drive_path, |d| d.blank)
    }

    async fn has_partition(&self, device_path: &str) -> Result<bool, MediaError> {
        self.with_device(device_path, |d| d.partition)
    }

    async fn mount(&self, device_path: &str) -> Result<(), MediaError> {
        self.record(Call::Mount(device_path.to_string()));
        self.check_connected()?;
        self.scripted(Op::Mount)?;
        self.update(device_path, |d| d.mountpoint = d.mount_target.clone());
        Ok(())
    }

    async fn unmount(&self, device_path: &str) -> Result<(), MediaError> {
        self.record(Call::Unmount(device_path.to_string()));
        self.check_connected()?;
        self.scripted(Op::Unmount)?;
        self.update(device_path, |d| {
            if !d.sticky_mount {
                d.mountpoint.clear();
            }
        });
        Ok(())
    }

    async fn eject(&self, drive_path: &str) -> Result<(), MediaError> {
        self.record(Call::Eject(drive_path.to_string()));
        self.check_connected()?;
        self.scripted(Op::Eject)?;
        for device in self.state().devices.values_mut() {
            if device.drive == drive_path {
                device.media = false;
                device.data_tracks = 0;
                device.audio_tracks = 0;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceBus for FakeService {
    async fn connect(&self) -> Result<(), MediaError> {
        self.record(Call::Connect);
        let mut state = self.state();
        if state.connect_succeeds {
            state.connected = true;
            Ok(())
        } else {
            Err(MediaError::disconnected())
        }
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn service_available(&self) -> bool {
        let state = self.state();
        state.connected && state.service_available
    }

    async fn is_device_valid(&self, device_path: &str) -> bool {
        let state = self.state();
        state.connected
            && state.service_available
            && state.devices.contains_key(device_path)
            && !state.invalid.contains(device_path)
    }

    async fn object_signals(&self) -> Result<SignalStream, MediaError> {
        self.record(Call::WatchObjects);
        self.check_connected()?;
        let (tx, rx) = unbounded();
        self.state().object_sender = Some(tx);
        Ok(rx.boxed())
    }

    async fn property_signals(&self, device_path: &str) -> Result<SignalStream, MediaError> {
        self.record(Call::WatchProperties(device_path.to_string()));
        self.check_connected()?;
        let (tx, rx) = unbounded();
        self.state()
            .property_senders
            .insert(device_path.to_string(), tx);
        Ok(rx.boxed())
    }
}
