// SPDX-License-Identifier: GPL-3.0-only

//! Removable media monitor
//!
//! Tracks the block devices published by the device-management service,
//! keeps their attributes fresh and publishes [`MonitorEvent`]s for a UI
//! collaborator. Mount, unmount and eject requests go through a
//! [`MonitorHandle`].
//!
//! ```no_run
//! use futures::StreamExt;
//! use media_monitor::{Monitor, MonitorConfig, logging};
//!
//! # async fn demo() -> media_monitor::Result<()> {
//! let config = MonitorConfig::load()?;
//! logging::init(&config);
//!
//! let (monitor, handle, mut events) = Monitor::udisks(config);
//! tokio::spawn(monitor.run());
//!
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! # drop(handle);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod handle;
pub mod logging;
pub mod monitor;

pub use config::{LoggingLevel, MonitorConfig};
pub use device::Device;
pub use error::{MonitorError, Result};
pub use handle::{MonitorCommand, MonitorEventStream, MonitorHandle};
pub use media_types::{DeviceEvent, DeviceInfo, MonitorEvent};
pub use monitor::Monitor;
