// SPDX-License-Identifier: GPL-3.0-only

//! UDisks2 client for the removable media monitor.
//!
//! [`UdisksClient`] implements both [`media_contracts::ServiceAdapter`] and
//! [`media_contracts::DeviceBus`], so a single `Arc<UdisksClient>` feeds
//! both seams of the monitor.

mod adapter;
mod client;
mod dbus;

pub mod error;
pub mod manager;

pub use client::UdisksClient;
pub use dbus::bytestring::{decode_c_string_bytes, decode_mount_points, first_mount_point};
pub use error::UdisksError;
pub use manager::{UDISKS2_SERVICE, UDisks2ManagerProxy, UDisks2ObjectManagerProxy};
