use super::{DiskUsage, FileInfo, LocalConfig, LocalStorage, NasConfig, StorageBackend};
use crate::Result;
use async_trait::async_trait;
use std::path::Path;

/// NAS存储：已挂载到本地的网络路径，行为与本地存储一致
pub struct NasStorage {
    inner: LocalStorage,
}

impl NasStorage {
    pub fn new(config: NasConfig) -> Result<Self> {
        let inner = LocalStorage::new(LocalConfig {
            base_path: config.mount_path,
        })?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl StorageBackend for NasStorage {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        self.inner.upload(local_path, remote_path).await
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        self.inner.download(remote_path, local_path).await
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        self.inner.delete(remote_path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<FileInfo>> {
        self.inner.list(prefix).await
    }

    async fn exists(&self, remote_path: &str) -> Result<bool> {
        self.inner.exists(remote_path).await
    }

    async fn file_info(&self, remote_path: &str) -> Result<FileInfo> {
        self.inner.file_info(remote_path).await
    }

    async fn test_connection(&self) -> Result<()> {
        self.inner.test_connection().await
    }

    async fn disk_usage(&self) -> Result<DiskUsage> {
        self.inner.disk_usage().await
    }
}
