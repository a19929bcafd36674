// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for removable media monitoring
//!
//! These models are shared by every layer of the stack:
//!
//! - **media-udisks**: emits [`BusSignal`]s from the system bus
//! - **media-monitor**: tracks devices, produces [`DeviceEvent`]s and [`MonitorEvent`]s
//! - **UI collaborators**: consume [`MonitorEvent`]s and [`DeviceInfo`] snapshots
//!
//! UI code keys devices on their object path. It never holds a live device.

pub mod device;
pub mod event;

pub use device::{DeviceInfo, SERVICE_ROOT_PATH, device_node_name, is_job_path};
pub use event::{BusSignal, DeviceEvent, MonitorEvent};
