// SPDX-License-Identifier: GPL-3.0-only

//! [`ServiceAdapter`] implementation over the UDisks2 proxies

use std::collections::HashMap;

use async_trait::async_trait;
use media_contracts::{MediaError, ServiceAdapter};
use tracing::{debug, info};
use udisks2::{
    block::BlockProxy, drive::DriveProxy, filesystem::FilesystemProxy, partition::PartitionProxy,
};
use zbus::proxy::CacheProperties;
use zbus::zvariant::Value;

use crate::client::UdisksClient;
use crate::dbus::bytestring;
use crate::error::UdisksError;
use crate::manager::UDisks2ManagerProxy;

/// Drive path reported for block devices without a drive (loop devices, ...)
const NO_DRIVE: &str = "/";

impl UdisksClient {
    pub(crate) async fn block<'p>(&self, path: &'p str) -> Result<BlockProxy<'p>, UdisksError> {
        let connection = self.connection()?;
        Ok(BlockProxy::builder(&connection)
            .path(path)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?)
    }

    async fn drive<'p>(&self, path: &'p str) -> Result<DriveProxy<'p>, UdisksError> {
        if path.is_empty() || path == NO_DRIVE {
            return Err(UdisksError::InvalidPath(format!("no drive at '{path}'")));
        }
        let connection = self.connection()?;
        Ok(DriveProxy::builder(&connection)
            .path(path)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?)
    }

    async fn filesystem_proxy<'p>(
        &self,
        path: &'p str,
    ) -> Result<FilesystemProxy<'p>, UdisksError> {
        let connection = self.connection()?;
        Ok(FilesystemProxy::builder(&connection)
            .path(path)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?)
    }

    async fn block_device_paths(&self) -> Result<Vec<String>, UdisksError> {
        let connection = self.connection()?;
        let manager = UDisks2ManagerProxy::new(&connection).await?;
        let paths = manager.get_block_devices(HashMap::new()).await?;
        Ok(paths.into_iter().map(|p| p.to_string()).collect())
    }

    async fn block_drive(&self, device_path: &str) -> Result<String, UdisksError> {
        Ok(self.block(device_path).await?.drive().await?.to_string())
    }

    async fn drive_name(&self, drive_path: &str) -> Result<String, UdisksError> {
        let drive = self.drive(drive_path).await?;
        let vendor = drive.vendor().await?;
        let model = drive.model().await?;
        Ok(format!("{} {}", vendor.trim(), model.trim())
            .trim()
            .to_string())
    }

    async fn first_mount_point(&self, device_path: &str) -> Result<String, UdisksError> {
        let fs = self.filesystem_proxy(device_path).await?;
        Ok(bytestring::first_mount_point(fs.mount_points().await?))
    }

    async fn id_type(&self, device_path: &str) -> Result<String, UdisksError> {
        Ok(self.block(device_path).await?.id_type().await?)
    }

    async fn partition_table(&self, device_path: &str) -> Result<bool, UdisksError> {
        let connection = self.connection()?;
        let partition = PartitionProxy::builder(&connection)
            .path(device_path)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;
        // Only partitions carry a Table property.
        Ok(partition.table().await.is_ok())
    }

    async fn mount_filesystem(&self, device_path: &str) -> Result<String, UdisksError> {
        let fs = self.filesystem_proxy(device_path).await?;
        let options: HashMap<&str, Value<'_>> = HashMap::new();
        Ok(fs.mount(options).await?)
    }

    async fn unmount_filesystem(&self, device_path: &str) -> Result<(), UdisksError> {
        let fs = self.filesystem_proxy(device_path).await?;
        let options: HashMap<&str, Value<'_>> = HashMap::new();
        fs.unmount(options).await?;
        Ok(())
    }

    async fn eject_drive(&self, drive_path: &str) -> Result<(), UdisksError> {
        let drive = self.drive(drive_path).await?;
        let options: HashMap<&str, Value<'_>> = HashMap::new();
        drive.eject(options).await?;
        Ok(())
    }
}

#[async_trait]
impl ServiceAdapter for UdisksClient {
    async fn enumerate_device_paths(&self) -> Result<Vec<String>, MediaError> {
        self.block_device_paths().await.map_err(|e| self.fail(e))
    }

    async fn drive_path(&self, device_path: &str) -> Result<String, MediaError> {
        self.block_drive(device_path).await.map_err(|e| self.fail(e))
    }

    async fn device_name(&self, drive_path: &str) -> Result<String, MediaError> {
        self.drive_name(drive_path).await.map_err(|e| self.fail(e))
    }

    async fn is_removable(&self, drive_path: &str) -> Result<bool, MediaError> {
        let drive = self.drive(drive_path).await.map_err(|e| self.fail(e))?;
        drive
            .removable()
            .await
            .map_err(|e| self.fail(UdisksError::from(e)))
    }

    async fn mount_point(&self, device_path: &str) -> Result<String, MediaError> {
        self.first_mount_point(device_path)
            .await
            .map_err(|e| self.fail(e))
    }

    async fn filesystem(&self, device_path: &str) -> Result<String, MediaError> {
        self.id_type(device_path).await.map_err(|e| self.fail(e))
    }

    async fn is_optical(&self, drive_path: &str) -> Result<bool, MediaError> {
        let drive = self.drive(drive_path).await.map_err(|e| self.fail(e))?;
        drive
            .optical()
            .await
            .map_err(|e| self.fail(UdisksError::from(e)))
    }

    async fn has_media(&self, drive_path: &str) -> Result<bool, MediaError> {
        let drive = self.drive(drive_path).await.map_err(|e| self.fail(e))?;
        drive
            .media_available()
            .await
            .map_err(|e| self.fail(UdisksError::from(e)))
    }

    async fn optical_data_tracks(&self, drive_path: &str) -> Result<u32, MediaError> {
        let drive = self.drive(drive_path).await.map_err(|e| self.fail(e))?;
        drive
            .optical_num_data_tracks()
            .await
            .map_err(|e| self.fail(UdisksError::from(e)))
    }

    async fn optical_audio_tracks(&self, drive_path: &str) -> Result<u32, MediaError> {
        let drive = self.drive(drive_path).await.map_err(|e| self.fail(e))?;
        drive
            .optical_num_audio_tracks()
            .await
            .map_err(|e| self.fail(UdisksError::from(e)))
    }

    async fn is_blank_optical(&self, drive_path: &str) -> Result<bool, MediaError> {
        let drive = self.drive(drive_path).await.map_err(|e| self.fail(e))?;
        drive
            .optical_blank()
            .await
            .map_err(|e| self.fail(UdisksError::from(e)))
    }

    async fn has_partition(&self, device_path: &str) -> Result<bool, MediaError> {
        self.partition_table(device_path)
            .await
            .map_err(|e| self.fail(e))
    }

    async fn mount(&self, device_path: &str) -> Result<(), MediaError> {
        let mount_point = self
            .mount_filesystem(device_path)
            .await
            .map_err(|e| self.fail(e))?;
        info!("Mounted {device_path} at {mount_point}");
        Ok(())
    }

    async fn unmount(&self, device_path: &str) -> Result<(), MediaError> {
        self.unmount_filesystem(device_path)
            .await
            .map_err(|e| self.fail(e))?;
        info!("Unmounted {device_path}");
        Ok(())
    }

    async fn eject(&self, drive_path: &str) -> Result<(), MediaError> {
        self.eject_drive(drive_path).await.map_err(|e| self.fail(e))?;
        debug!("Ejected {drive_path}");
        Ok(())
    }
}
