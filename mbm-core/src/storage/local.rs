use super::{DiskUsage, FileInfo, LocalConfig, StorageBackend};
use crate::{MbmError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 本地文件系统存储
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(config: LocalConfig) -> Result<Self> {
        let base_path = PathBuf::from(config.base_path);
        std::fs::create_dir_all(&base_path)
            .map_err(|e| MbmError::storage(format!("创建存储目录失败: {e}")))?;
        Ok(Self { base_path })
    }

    fn full_path(&self, remote_path: &str) -> PathBuf {
        self.base_path.join(remote_path)
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let dst = self.full_path(remote_path);

        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MbmError::storage(format!("创建目标目录失败: {e}")))?;
        }

        tokio::fs::copy(local_path, &dst)
            .await
            .map_err(|e| MbmError::storage(format!("上传文件失败: {e}")))?;
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let src = self.full_path(remote_path);

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MbmError::storage(format!("创建本地目录失败: {e}")))?;
        }

        tokio::fs::copy(&src, local_path)
            .await
            .map_err(|e| MbmError::storage(format!("下载文件失败: {e}")))?;
        Ok(())
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        tokio::fs::remove_file(self.full_path(remote_path))
            .await
            .map_err(|e| MbmError::storage(format!("删除文件失败: {e}")))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<FileInfo>> {
        let base = self.base_path.clone();
        let search = self.full_path(prefix);

        // 目录遍历是阻塞操作
        let files = tokio::task::spawn_blocking(move || -> Result<Vec<FileInfo>> {
            let mut files = Vec::new();

            if !search.exists() {
                return Ok(files);
            }

            for entry in WalkDir::new(&search) {
                let entry = entry?;
                if !entry.path().is_file() {
                    continue;
                }

                let metadata = entry.metadata()?;
                let relative = entry
                    .path()
                    .strip_prefix(&base)?
                    .to_string_lossy()
                    .replace('\\', "/");
                let modified: DateTime<Utc> = metadata
                    .modified()
                    .map(DateTime::from)
                    .unwrap_or_else(|_| Utc::now());

                files.push(FileInfo {
                    name: entry.file_name().to_string_lossy().to_string(),
                    path: relative,
                    size: metadata.len() as i64,
                    modified,
                });
            }

            Ok(files)
        })
        .await??;

        Ok(files)
    }

    async fn exists(&self, remote_path: &str) -> Result<bool> {
        match tokio::fs::metadata(self.full_path(remote_path)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MbmError::storage(format!("检查文件失败: {e}"))),
        }
    }

    async fn file_info(&self, remote_path: &str) -> Result<FileInfo> {
        let full = self.full_path(remote_path);
        let metadata = tokio::fs::metadata(&full)
            .await
            .map_err(|e| MbmError::storage(format!("获取文件信息失败: {e}")))?;

        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(FileInfo {
            name: full
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            path: remote_path.to_string(),
            size: metadata.len() as i64,
            modified,
        })
    }

    async fn test_connection(&self) -> Result<()> {
        // 检查目录可写
        let probe = self.base_path.join(".mbm_probe");
        tokio::fs::write(&probe, b"probe")
            .await
            .map_err(|e| MbmError::storage(format!("存储目录不可写: {e}")))?;
        let _ = tokio::fs::remove_file(&probe).await;
        Ok(())
    }

    #[cfg(unix)]
    async fn disk_usage(&self) -> Result<DiskUsage> {
        let stat = nix::sys::statvfs::statvfs(&self.base_path)
            .map_err(|e| MbmError::storage(format!("获取磁盘空间失败: {e}")))?;

        let fragment = stat.fragment_size() as u64;
        let total = fragment * stat.blocks() as u64;
        let free = fragment * stat.blocks_available() as u64;
        let used = total - fragment * stat.blocks_free() as u64;

        Ok(DiskUsage { total, used, free })
    }
}
