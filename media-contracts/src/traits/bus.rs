// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use futures::stream::BoxStream;
use media_types::BusSignal;

use crate::MediaError;

pub type SignalStream = BoxStream<'static, BusSignal>;

/// Transport, presence and subscription seam of the system bus.
#[async_trait]
pub trait DeviceBus: Send + Sync {
    /// Connect the transport if it is not connected yet.
    async fn connect(&self) -> Result<(), MediaError>;

    /// Whether the transport-level bus connection is up.
    fn is_connected(&self) -> bool;

    /// Whether the device-management service currently owns its bus name.
    async fn service_available(&self) -> bool;

    /// Whether the block interface at `device_path` can be talked to.
    async fn is_device_valid(&self, device_path: &str) -> bool;

    /// `BusSignal::Added` / `BusSignal::Removed` for objects under the
    /// service's namespace.
    async fn object_signals(&self) -> Result<SignalStream, MediaError>;

    /// `BusSignal::PropertiesChanged` for one object.
    async fn property_signals(&self, device_path: &str) -> Result<SignalStream, MediaError>;
}
