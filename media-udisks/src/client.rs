// SPDX-License-Identifier: GPL-3.0-only

//! System bus connection and the [`DeviceBus`] side of the UDisks2 client

use std::sync::RwLock;

use async_trait::async_trait;
use futures::StreamExt;
use media_contracts::{DeviceBus, MediaError, MediaErrorKind, SignalStream};
use media_types::BusSignal;
use tracing::{debug, info, warn};
use zbus::Connection;
use zbus::names::WellKnownName;
use zbus::proxy::CacheProperties;

use crate::error::UdisksError;
use crate::manager::{UDISKS2_SERVICE, UDisks2ObjectManagerProxy};

/// Client for the UDisks2 service on the system bus.
///
/// The connection is optional: the client starts disconnected and the
/// monitor's connect step establishes it. A transport-level failure on any
/// call drops the connection again so the next health check reconnects.
#[derive(Default)]
pub struct UdisksClient {
    connection: RwLock<Option<Connection>>,
}

impl UdisksClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connection(&self) -> Result<Connection, UdisksError> {
        self.connection
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or(UdisksError::NotConnected)
    }

    fn drop_connection(&self) {
        if let Ok(mut slot) = self.connection.write() {
            *slot = None;
        }
    }

    /// Translate a failed call, forgetting the connection if the transport died.
    pub(crate) fn fail(&self, error: UdisksError) -> MediaError {
        if error.zbus().is_some() && error.is_transport_lost() {
            warn!("System bus transport lost: {error}");
            self.drop_connection();
        }
        error.into()
    }

    async fn object_signal_stream(&self) -> Result<SignalStream, UdisksError> {
        let connection = self.connection()?;
        let object_manager = UDisks2ObjectManagerProxy::new(&connection).await?;

        let added = object_manager
            .receive_interfaces_added()
            .await?
            .filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(BusSignal::Added(args.object_path.to_string())),
                    Err(e) => {
                        warn!("Failed to parse InterfacesAdded signal args: {e}");
                        None
                    }
                }
            });

        let removed = object_manager
            .receive_interfaces_removed()
            .await?
            .filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(BusSignal::Removed(args.object_path.to_string())),
                    Err(e) => {
                        warn!("Failed to parse InterfacesRemoved signal args: {e}");
                        None
                    }
                }
            });

        Ok(futures::stream::select(added, removed).boxed())
    }

    async fn property_signal_stream(&self, device_path: &str) -> Result<SignalStream, UdisksError> {
        let connection = self.connection()?;
        let owned_path = device_path.to_string();

        let properties = zbus::fdo::PropertiesProxy::builder(&connection)
            .destination(UDISKS2_SERVICE)?
            .path(owned_path.clone())?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        let changes = properties
            .receive_properties_changed()
            .await
            .map_err(|e| UdisksError::DBusError(e.to_string()))?;

        Ok(changes
            .map(move |_| BusSignal::PropertiesChanged(owned_path.clone()))
            .boxed())
    }
}

#[async_trait]
impl DeviceBus for UdisksClient {
    async fn connect(&self) -> Result<(), MediaError> {
        if self.is_connected() {
            return Ok(());
        }

        let connection = Connection::system().await.map_err(|e| {
            MediaError::new(
                MediaErrorKind::Disconnected,
                UdisksError::ConnectionFailed(e.to_string()).to_string(),
            )
        })?;

        if let Ok(mut slot) = self.connection.write() {
            *slot = Some(connection);
        }
        info!("Connected to the system bus");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection().is_ok()
    }

    async fn service_available(&self) -> bool {
        let Ok(connection) = self.connection() else {
            return false;
        };

        let dbus = match zbus::fdo::DBusProxy::new(&connection).await {
            Ok(proxy) => proxy,
            Err(e) => {
                debug!("Could not create bus daemon proxy: {e}");
                return false;
            }
        };

        let name = WellKnownName::from_static_str_unchecked(UDISKS2_SERVICE);
        match dbus.name_has_owner(name.into()).await {
            Ok(owned) => owned,
            Err(e) => {
                debug!("NameHasOwner({UDISKS2_SERVICE}) failed: {e}");
                false
            }
        }
    }

    async fn is_device_valid(&self, device_path: &str) -> bool {
        let device = match self.block(device_path).await {
            Ok(block) => block.device().await.map_err(UdisksError::from),
            Err(e) => Err(e),
        };
        match device {
            Ok(_) => true,
            Err(e) => {
                let error = self.fail(e);
                debug!("{device_path} has no usable block interface: {error}");
                false
            }
        }
    }

    async fn object_signals(&self) -> Result<SignalStream, MediaError> {
        self.object_signal_stream().await.map_err(|e| self.fail(e))
    }

    async fn property_signals(&self, device_path: &str) -> Result<SignalStream, MediaError> {
        self.property_signal_stream(device_path)
            .await
            .map_err(|e| self.fail(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_translates_udisks_errors() {
        let client = UdisksClient::new();
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let error = client.fail(UdisksError::Udisks(udisks2::Error::Zbus(
            zbus::Error::InputOutput(std::sync::Arc::new(io)),
        )));
        assert_eq!(error.kind, MediaErrorKind::Disconnected);

        let error = client.fail(UdisksError::Udisks(udisks2::Error::DeviceBusy));
        assert_eq!(error.kind, MediaErrorKind::Busy);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn fresh_client_is_disconnected() {
        let client = UdisksClient::new();

        assert!(!client.is_connected());
        assert!(!client.service_available().await);
        assert!(!client.is_device_valid("/org/freedesktop/UDisks2/block_devices/sdb").await);

        let error = client.object_signals().await.err().expect("not connected");
        assert_eq!(error.kind, MediaErrorKind::Disconnected);
    }
}
