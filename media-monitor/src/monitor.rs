// SPDX-License-Identifier: GPL-3.0-only

//! Device registry and monitor
//!
//! The monitor owns every tracked [`Device`] and is driven from a single
//! loop ([`Monitor::run`]): bus notifications, health-check ticks and UI
//! commands are handled one at a time, in arrival order. Subscriptions are
//! forwarded into that loop by small tasks that never touch the registry.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use media_contracts::{DeviceBus, ServiceAdapter, SignalStream};
use media_types::{BusSignal, DeviceEvent, DeviceInfo, MonitorEvent, is_job_path};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::MonitorConfig;
use crate::device::Device;
use crate::handle::{MonitorCommand, MonitorEventStream, MonitorHandle};
use crate::logging;

pub struct Monitor {
    adapter: Arc<dyn ServiceAdapter>,
    bus: Arc<dyn DeviceBus>,
    config: MonitorConfig,
    devices: HashMap<String, Device>,
    events: mpsc::UnboundedSender<MonitorEvent>,
    device_events_tx: mpsc::UnboundedSender<DeviceEvent>,
    device_events_rx: mpsc::UnboundedReceiver<DeviceEvent>,
    signals_tx: mpsc::UnboundedSender<BusSignal>,
    signals_rx: mpsc::UnboundedReceiver<BusSignal>,
    commands: mpsc::UnboundedReceiver<MonitorCommand>,
    object_watch: Option<JoinHandle<()>>,
}

fn forward_signals(
    mut stream: SignalStream,
    signals: mpsc::UnboundedSender<BusSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = stream.next().await {
            if signals.send(signal).is_err() {
                break;
            }
        }
    })
}

impl Monitor {
    pub fn new(
        adapter: Arc<dyn ServiceAdapter>,
        bus: Arc<dyn DeviceBus>,
        config: MonitorConfig,
    ) -> (Self, MonitorHandle, MonitorEventStream) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (device_events_tx, device_events_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();

        let monitor = Self {
            adapter,
            bus,
            config,
            devices: HashMap::new(),
            events,
            device_events_tx,
            device_events_rx,
            signals_tx,
            signals_rx,
            commands,
            object_watch: None,
        };

        (
            monitor,
            MonitorHandle::new(commands_tx),
            MonitorEventStream::new(events_rx),
        )
    }

    /// Monitor backed by UDisks2 on the system bus.
    ///
    /// The bus is connected lazily by [`Monitor::run`].
    pub fn udisks(config: MonitorConfig) -> (Self, MonitorHandle, MonitorEventStream) {
        let client = Arc::new(media_udisks::UdisksClient::new());
        Self::new(client.clone(), client, config)
    }

    /// Drive the monitor until every [`MonitorHandle`] is dropped.
    pub async fn run(mut self) {
        info!(
            "Starting removable media monitor (health check every {}s)",
            self.config.health_check_interval().as_secs()
        );

        self.connect().await;

        let period = self.config.health_check_interval();
        let mut health = tokio::time::interval_at(Instant::now() + period, period);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(signal) = self.signals_rx.recv() => self.handle_signal(signal).await,
                _ = health.tick() => self.check_service().await,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }

        info!("Removable media monitor stopped");
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Tracked device with this path
    pub fn device(&self, path: &str) -> Option<&DeviceInfo> {
        self.devices.get(path).map(Device::info)
    }

    /// Snapshot of every tracked device, sorted by path
    pub fn devices(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = self.devices.values().map(|d| d.info().clone()).collect();
        devices.sort_by(|a, b| a.path.cmp(&b.path));
        devices
    }

    pub fn tracked_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.devices.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Establish the transport, subscribe to object notifications and
    /// reconcile. Skipped while the bus cannot be reached.
    ///
    /// On a fresh transport every tracked device subscribes again and is
    /// refreshed, since its old subscription died with the old connection.
    pub async fn connect(&mut self) {
        let reconnected = !self.bus.is_connected();
        if reconnected && let Err(e) = self.bus.connect().await {
            warn!(
                "System bus unavailable, retrying in {}s: {e}",
                self.config.health_check_interval().as_secs()
            );
            return;
        }

        match self.bus.object_signals().await {
            Ok(stream) => {
                if let Some(previous) = self.object_watch.take() {
                    previous.abort();
                }
                self.object_watch = Some(forward_signals(stream, self.signals_tx.clone()));
                debug!("Subscribed to device added/removed notifications");
            }
            Err(e) => warn!("Could not subscribe to device notifications: {e}"),
        }

        if reconnected {
            self.resubscribe_devices().await;
        }
        self.scan_devices().await;
    }

    async fn resubscribe_devices(&mut self) {
        for device in self.devices.values_mut() {
            device.resubscribe(self.signals_tx.clone()).await;
            device.refresh().await;
            debug!("Resubscribed {}", device.path());
        }
        self.forward_device_events();
    }

    /// Track every enumerated path that is not tracked yet.
    ///
    /// Already tracked devices are left alone and nothing is removed here.
    /// Always ends with [`MonitorEvent::UpdatedDevices`].
    pub async fn scan_devices(&mut self) {
        let paths = match self.adapter.enumerate_device_paths().await {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Device enumeration failed: {e}");
                Vec::new()
            }
        };

        for path in paths {
            if self.devices.contains_key(&path) {
                continue;
            }

            let device = Device::new(
                path.clone(),
                self.adapter.clone(),
                self.bus.clone(),
                self.device_events_tx.clone(),
                self.signals_tx.clone(),
            )
            .await;
            debug!("Tracking {path}");
            self.devices.insert(path, device);
        }

        self.forward_device_events();
        self.emit(MonitorEvent::UpdatedDevices);
    }

    pub async fn handle_signal(&mut self, signal: BusSignal) {
        trace!("Bus notification for {}", signal.path());
        match signal {
            BusSignal::Added(path) => self.handle_device_added(path).await,
            BusSignal::Removed(path) => self.handle_device_removed(path).await,
            BusSignal::PropertiesChanged(path) => self.handle_properties_changed(&path).await,
        }
    }

    pub async fn handle_device_added(&mut self, path: String) {
        if is_job_path(&path) {
            return;
        }
        if !self.bus.service_available().await {
            debug!("Ignoring added {path}: service not available");
            return;
        }

        self.scan_devices().await;
        info!("Found new device {path}");
        self.emit(MonitorEvent::FoundNewDevice { path });
    }

    pub async fn handle_device_removed(&mut self, path: String) {
        if is_job_path(&path) {
            return;
        }
        if !self.bus.service_available().await {
            debug!("Ignoring removed {path}: service not available");
            return;
        }

        if self.devices.contains_key(&path) {
            // Removed and re-added within one service transaction shows up
            // as a removal of a path that still enumerates.
            match self.adapter.enumerate_device_paths().await {
                Ok(live) if live.contains(&path) => {
                    debug!("Ignoring removal of {path}: still present");
                    return;
                }
                Ok(_) => {}
                Err(e) => warn!("Could not confirm removal of {path}: {e}"),
            }

            if self.devices.remove(&path).is_some() {
                info!("Device {path} removed");
            }
        }

        self.scan_devices().await;
    }

    pub async fn handle_properties_changed(&mut self, path: &str) {
        let Some(device) = self.devices.get_mut(path) else {
            return;
        };
        device.refresh().await;
        self.forward_device_events();
    }

    /// Periodic self-healing.
    ///
    /// Reconnects a dropped transport; re-enumerates when the service is
    /// not on the bus (e.g. it restarted) without re-subscribing.
    pub async fn check_service(&mut self) {
        if !self.bus.is_connected() {
            self.connect().await;
            return;
        }

        if !self.bus.service_available().await {
            debug!("Device service not available, resynchronizing");
            self.scan_devices().await;
        }
    }

    pub async fn mount(&mut self, path: &str) {
        match self.devices.get_mut(path) {
            Some(device) => device.mount().await,
            None => warn!("Mount requested for unknown device {path}"),
        }
        self.forward_device_events();
    }

    pub async fn unmount(&mut self, path: &str) {
        match self.devices.get_mut(path) {
            Some(device) => device.unmount().await,
            None => warn!("Unmount requested for unknown device {path}"),
        }
        self.forward_device_events();
    }

    pub async fn eject(&mut self, path: &str) {
        match self.devices.get_mut(path) {
            Some(device) => device.eject().await,
            None => warn!("Eject requested for unknown device {path}"),
        }
        self.forward_device_events();
    }

    async fn handle_command(&mut self, command: MonitorCommand) {
        match command {
            MonitorCommand::Mount(path) => self.mount(&path).await,
            MonitorCommand::Unmount(path) => self.unmount(&path).await,
            MonitorCommand::Eject(path) => self.eject(&path).await,
            MonitorCommand::Rescan => self.scan_devices().await,
            MonitorCommand::SetLogLevel(level) => {
                self.config.log_level = level;
                match logging::set_log_level(level) {
                    Ok(()) => info!("Log level set to {}", level.as_directive()),
                    Err(e) => debug!("Log level not applied: {e:#}"),
                }
            }
            MonitorCommand::Devices(reply) => {
                let _ = reply.send(self.devices());
            }
        }
    }

    /// Republish queued device events as registry events.
    fn forward_device_events(&mut self) {
        while let Ok(event) = self.device_events_rx.try_recv() {
            match MonitorEvent::from_device_event(event) {
                Some(event) => self.emit(event),
                None => debug!("Device-level only event dropped by registry"),
            }
        }
    }

    fn emit(&self, event: MonitorEvent) {
        if self.events.send(event).is_err() {
            debug!("No listener for monitor events");
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(watch) = self.object_watch.take() {
            watch.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingLevel;
    use media_contracts::MediaError;
    use media_testing::{Call, FakeDevice, FakeService, Op};

    const A: &str = "/org/freedesktop/UDisks2/block_devices/sda1";
    const B: &str = "/org/freedesktop/UDisks2/block_devices/sdb1";
    const C: &str = "/org/freedesktop/UDisks2/block_devices/sdc1";
    const SR0: &str = "/org/freedesktop/UDisks2/block_devices/sr0";
    const JOB: &str = "/org/freedesktop/UDisks2/jobs/7";

    fn setup(paths: &[&str]) -> (Arc<FakeService>, Monitor, MonitorHandle, MonitorEventStream) {
        let fake = Arc::new(FakeService::new());
        for path in paths {
            fake.insert(path, FakeDevice::usb(path));
        }
        let (monitor, handle, events) =
            Monitor::new(fake.clone(), fake.clone(), MonitorConfig::default());
        (fake, monitor, handle, events)
    }

    fn count(events: &[MonitorEvent], wanted: &MonitorEvent) -> usize {
        events.iter().filter(|e| *e == wanted).count()
    }

    #[tokio::test]
    async fn scan_tracks_exactly_the_enumerated_devices() {
        let (_fake, mut monitor, _handle, mut events) = setup(&[A, B]);

        monitor.scan_devices().await;

        assert_eq!(monitor.tracked_paths(), vec![A.to_string(), B.to_string()]);
        assert_eq!(events.drain(), vec![MonitorEvent::UpdatedDevices]);
    }

    #[tokio::test]
    async fn rescan_keeps_existing_devices() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A, B]);
        monitor.scan_devices().await;
        events.drain();
        fake.take_calls();

        // Service-side change that reconstruction would surface as a rename.
        fake.update(A, |d| d.name = "Renamed".to_string());
        monitor.scan_devices().await;

        assert_eq!(monitor.device(A).unwrap().name, "USB Stick sda1");
        assert_eq!(fake.take_calls(), vec![Call::Enumerate]);
        assert_eq!(events.drain(), vec![MonitorEvent::UpdatedDevices]);
    }

    #[tokio::test]
    async fn added_device_is_tracked_and_announced() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A, B]);
        monitor.scan_devices().await;
        events.drain();

        fake.insert(C, FakeDevice::usb(C));
        monitor.handle_signal(BusSignal::Added(C.to_string())).await;

        assert_eq!(
            monitor.tracked_paths(),
            vec![A.to_string(), B.to_string(), C.to_string()]
        );
        assert_eq!(
            events.drain(),
            vec![
                MonitorEvent::UpdatedDevices,
                MonitorEvent::FoundNewDevice {
                    path: C.to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn job_notifications_are_ignored() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        monitor.scan_devices().await;
        events.drain();
        fake.take_calls();

        monitor.handle_signal(BusSignal::Added(JOB.to_string())).await;
        monitor.handle_signal(BusSignal::Removed(JOB.to_string())).await;

        assert!(fake.take_calls().is_empty());
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn notifications_are_ignored_while_service_is_gone() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        monitor.scan_devices().await;
        events.drain();
        fake.take_calls();
        fake.set_service_available(false);

        monitor.handle_signal(BusSignal::Added(B.to_string())).await;
        monitor.handle_signal(BusSignal::Removed(A.to_string())).await;

        assert_eq!(monitor.tracked_paths(), vec![A.to_string()]);
        assert!(fake.take_calls().is_empty());
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn confirmed_removal_drops_device() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A, B, C]);
        monitor.scan_devices().await;
        events.drain();

        fake.remove(B);
        monitor.handle_signal(BusSignal::Removed(B.to_string())).await;

        assert_eq!(monitor.tracked_paths(), vec![A.to_string(), C.to_string()]);
        let events = events.drain();
        assert_eq!(count(&events, &MonitorEvent::UpdatedDevices), 1);
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, MonitorEvent::DeviceError { .. }))
        );
    }

    #[tokio::test]
    async fn spurious_removal_keeps_device() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A, B]);
        monitor.scan_devices().await;
        events.drain();
        fake.take_calls();

        monitor.handle_signal(BusSignal::Removed(B.to_string())).await;

        assert_eq!(monitor.tracked_paths(), vec![A.to_string(), B.to_string()]);
        assert_eq!(fake.take_calls(), vec![Call::Enumerate]);
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn removal_of_untracked_path_only_rescans() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        monitor.scan_devices().await;
        events.drain();
        fake.insert(C, FakeDevice::usb(C));

        monitor.handle_signal(BusSignal::Removed(B.to_string())).await;

        assert_eq!(monitor.tracked_paths(), vec![A.to_string(), C.to_string()]);
        assert_eq!(events.drain(), vec![MonitorEvent::UpdatedDevices]);
    }

    #[tokio::test]
    async fn tracked_set_follows_enumeration_through_add_and_remove() {
        let (fake, mut monitor, _handle, _events) = setup(&[A, B]);
        monitor.connect().await;

        fake.insert(C, FakeDevice::usb(C));
        monitor.handle_device_added(C.to_string()).await;
        fake.remove(A);
        monitor.handle_device_removed(A.to_string()).await;
        fake.remove(B);
        fake.insert(SR0, FakeDevice::optical(SR0));
        monitor.handle_device_removed(B.to_string()).await;

        let live = {
            let mut live = fake.enumerate_device_paths().await.unwrap();
            live.sort();
            live
        };
        assert_eq!(monitor.tracked_paths(), live);
    }

    #[tokio::test]
    async fn mount_emits_mountpoint_change() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        fake.update(A, |d| d.mount_target = "/media/A".to_string());
        monitor.scan_devices().await;
        events.drain();

        monitor.mount(A).await;

        assert_eq!(
            events.drain(),
            vec![MonitorEvent::MountpointChanged {
                path: A.to_string(),
                mountpoint: "/media/A".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn operation_errors_are_republished() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        fake.fail(Op::Mount, MediaError::failed("Filesystem is dirty"));
        monitor.scan_devices().await;
        events.drain();

        monitor.mount(A).await;

        assert_eq!(
            events.drain(),
            vec![MonitorEvent::DeviceError {
                path: A.to_string(),
                message: "Filesystem is dirty".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn commands_for_unknown_devices_are_ignored() {
        let (fake, mut monitor, _handle, mut events) = setup(&[]);
        monitor.scan_devices().await;
        events.drain();
        fake.take_calls();

        monitor.mount(A).await;
        monitor.unmount(A).await;
        monitor.eject(A).await;

        assert!(fake.take_calls().is_empty());
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn property_change_refreshes_device_and_hides_name_changes() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        monitor.scan_devices().await;
        events.drain();

        fake.update(A, |d| {
            d.media = false;
            d.name = "Card Reader".to_string();
        });
        monitor
            .handle_signal(BusSignal::PropertiesChanged(A.to_string()))
            .await;

        assert_eq!(monitor.device(A).unwrap().name, "Card Reader");
        assert_eq!(
            events.drain(),
            vec![MonitorEvent::MediaChanged {
                path: A.to_string(),
                present: false,
            }]
        );
    }

    #[tokio::test]
    async fn connect_subscribes_then_scans() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);

        monitor.connect().await;

        let calls = fake.take_calls();
        assert_eq!(calls[0], Call::WatchObjects);
        assert_eq!(calls[1], Call::Enumerate);
        assert_eq!(monitor.tracked_paths(), vec![A.to_string()]);
        assert_eq!(events.drain(), vec![MonitorEvent::UpdatedDevices]);
    }

    #[tokio::test]
    async fn connect_is_skipped_while_bus_is_unreachable() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        fake.set_connected(false);
        fake.set_connect_succeeds(false);

        monitor.connect().await;

        assert_eq!(fake.take_calls(), vec![Call::Connect]);
        assert!(monitor.tracked_paths().is_empty());
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn health_check_reconnects_dropped_transport() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        fake.set_connected(false);

        monitor.check_service().await;

        let calls = fake.take_calls();
        assert_eq!(calls[..2], [Call::Connect, Call::WatchObjects]);
        assert_eq!(monitor.tracked_paths(), vec![A.to_string()]);
        assert_eq!(events.drain(), vec![MonitorEvent::UpdatedDevices]);
    }

    #[tokio::test]
    async fn reconnect_resubscribes_tracked_devices() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        monitor.connect().await;
        events.drain();
        fake.take_calls();

        fake.set_connected(false);
        monitor.check_service().await;

        assert_eq!(
            fake.take_calls(),
            vec![
                Call::Connect,
                Call::WatchObjects,
                Call::WatchProperties(A.to_string()),
                Call::Enumerate,
            ]
        );
        assert!(fake.is_watching(A));
        assert_eq!(events.drain(), vec![MonitorEvent::UpdatedDevices]);
    }

    #[tokio::test]
    async fn property_changes_reach_the_ui_after_reconnect() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        monitor.connect().await;
        fake.set_connected(false);
        monitor.check_service().await;
        events.drain();

        fake.update(A, |d| d.mountpoint = "/media/external".to_string());
        assert!(fake.emit_properties_changed(A));
        let signal = monitor.signals_rx.recv().await.unwrap();
        monitor.handle_signal(signal).await;

        assert_eq!(
            events.drain(),
            vec![MonitorEvent::MountpointChanged {
                path: A.to_string(),
                mountpoint: "/media/external".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn changes_missed_while_disconnected_are_reported_on_reconnect() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        monitor.connect().await;
        events.drain();

        fake.set_connected(false);
        fake.update(A, |d| d.media = false);
        monitor.check_service().await;

        assert_eq!(
            events.drain(),
            vec![
                MonitorEvent::MediaChanged {
                    path: A.to_string(),
                    present: false,
                },
                MonitorEvent::UpdatedDevices,
            ]
        );
    }

    #[tokio::test]
    async fn log_level_command_updates_config() {
        let (_fake, mut monitor, _handle, _events) = setup(&[]);

        monitor
            .handle_command(MonitorCommand::SetLogLevel(LoggingLevel::Debug))
            .await;

        assert_eq!(monitor.config().log_level, LoggingLevel::Debug);
    }

    #[tokio::test]
    async fn health_check_resyncs_without_resubscribing_when_service_is_gone() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        monitor.connect().await;
        events.drain();
        fake.take_calls();

        fake.set_service_available(false);
        monitor.check_service().await;

        assert_eq!(fake.take_calls(), vec![Call::Enumerate]);
        assert_eq!(events.drain(), vec![MonitorEvent::UpdatedDevices]);
    }

    #[tokio::test]
    async fn healthy_service_needs_no_work() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        monitor.connect().await;
        events.drain();
        fake.take_calls();

        monitor.check_service().await;

        assert!(fake.take_calls().is_empty());
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn failed_enumeration_still_reports_update() {
        let (fake, mut monitor, _handle, mut events) = setup(&[A]);
        monitor.scan_devices().await;
        events.drain();

        fake.set_enumerate_error(Some(MediaError::failed("timeout")));
        monitor.scan_devices().await;

        assert_eq!(monitor.tracked_paths(), vec![A.to_string()]);
        assert_eq!(events.drain(), vec![MonitorEvent::UpdatedDevices]);
    }
}
