//! Bus notifications, device-level events and registry-level events

use serde::{Deserialize, Serialize};

/// Raw notification delivered by the system bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BusSignal {
    /// An object appeared under the service's namespace
    Added(String),

    /// An object disappeared from the service's namespace
    Removed(String),

    /// Properties of the object at this path changed
    PropertiesChanged(String),
}

impl BusSignal {
    pub fn path(&self) -> &str {
        match self {
            Self::Added(path) | Self::Removed(path) | Self::PropertiesChanged(path) => path,
        }
    }
}

/// Change detected on a single tracked device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceEvent {
    MediaChanged { path: String, present: bool },
    MountpointChanged { path: String, mountpoint: String },
    NameChanged { path: String, name: String },
    Error { path: String, message: String },
}

/// Event published by the monitor to UI collaborators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A reconciliation pass finished. Fired even when nothing changed.
    UpdatedDevices,

    MediaChanged { path: String, present: bool },

    MountpointChanged { path: String, mountpoint: String },

    /// An added notification for a non-job object was handled
    FoundNewDevice { path: String },

    /// A mount, unmount or eject request failed
    DeviceError { path: String, message: String },
}

impl MonitorEvent {
    /// Registry-level counterpart of a device event.
    ///
    /// Name changes stay device-level and have no counterpart.
    pub fn from_device_event(event: DeviceEvent) -> Option<Self> {
        match event {
            DeviceEvent::MediaChanged { path, present } => {
                Some(Self::MediaChanged { path, present })
            }
            DeviceEvent::MountpointChanged { path, mountpoint } => {
                Some(Self::MountpointChanged { path, mountpoint })
            }
            DeviceEvent::Error { path, message } => Some(Self::DeviceError { path, message }),
            DeviceEvent::NameChanged { .. } => None,
        }
    }
}
