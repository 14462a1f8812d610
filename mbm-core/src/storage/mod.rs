// 存储目标
//
// 五种后端共享同一契约：本地目录、NAS挂载、S3、阿里云OSS、SSH远端。
// 配置以 JSON 存在存储实体里，在构造后端实例时解析成强类型结构，
// 未知或残缺的配置当场报错，不把失败推迟到具体操作里。

mod local;
mod nas;
mod oss;
mod s3;
mod ssh;

pub use local::LocalStorage;
pub use nas::NasStorage;
pub use oss::OssStorage;
pub use s3::S3Storage;
pub use ssh::SshStorage;

use crate::model::{Storage, StorageKind};
use crate::ssh::SshAuth;
use crate::{MbmError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// 存储侧的文件信息
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub size: i64,
    pub modified: DateTime<Utc>,
}

/// 磁盘空间（字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// 存储后端接口
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// 上传文件
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()>;
    /// 下载文件
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()>;
    /// 删除文件
    async fn delete(&self, remote_path: &str) -> Result<()>;
    /// 按前缀列出文件
    async fn list(&self, prefix: &str) -> Result<Vec<FileInfo>>;
    /// 检查文件是否存在
    async fn exists(&self, remote_path: &str) -> Result<bool>;
    /// 获取文件信息
    async fn file_info(&self, remote_path: &str) -> Result<FileInfo>;
    /// 测试连接
    async fn test_connection(&self) -> Result<()>;
    /// 磁盘空间；只有部分后端支持
    async fn disk_usage(&self) -> Result<DiskUsage> {
        Err(MbmError::storage("该存储后端不支持磁盘空间查询"))
    }
}

fn default_local_base() -> String {
    "./data/backups".to_string()
}

fn default_ssh_base() -> String {
    "/data/backups".to_string()
}

/// 本地存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_local_base")]
    pub base_path: String,
}

/// NAS存储配置（挂载到本地的网络路径）
#[derive(Debug, Clone, Deserialize)]
pub struct NasConfig {
    pub mount_path: String,
}

/// S3存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    pub bucket: String,
    #[serde(default)]
    pub region: String,
}

/// 阿里云OSS存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct OssConfig {
    pub endpoint: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub access_key_secret: String,
    pub bucket: String,
}

/// SSH存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct SshStorageConfig {
    #[serde(flatten)]
    pub auth: SshAuth,
    #[serde(default = "default_ssh_base")]
    pub base_path: String,
}

/// 按后端类型解析后的强类型配置
#[derive(Debug, Clone)]
pub enum StorageParams {
    Local(LocalConfig),
    Nas(NasConfig),
    S3(S3Config),
    Oss(OssConfig),
    Ssh(SshStorageConfig),
}

impl StorageParams {
    /// 解析并校验存储配置
    pub fn parse(kind: StorageKind, config_json: &str) -> Result<Self> {
        let raw = if config_json.trim().is_empty() {
            "{}"
        } else {
            config_json
        };

        let parse_err =
            |e: serde_json::Error| MbmError::validation(format!("存储配置解析失败: {e}"));

        match kind {
            StorageKind::Local => {
                let config: LocalConfig = serde_json::from_str(raw).map_err(parse_err)?;
                Ok(StorageParams::Local(config))
            }
            StorageKind::Nas => {
                let config: NasConfig = serde_json::from_str(raw).map_err(parse_err)?;
                if config.mount_path.trim().is_empty() {
                    return Err(MbmError::validation("NAS 存储缺少 mount_path"));
                }
                Ok(StorageParams::Nas(config))
            }
            StorageKind::S3 => {
                let mut config: S3Config = serde_json::from_str(raw).map_err(parse_err)?;
                if config.bucket.trim().is_empty() {
                    return Err(MbmError::validation("S3 存储缺少 bucket"));
                }
                if config.region.trim().is_empty() {
                    config.region = "us-east-1".to_string();
                }
                Ok(StorageParams::S3(config))
            }
            StorageKind::Oss => {
                let config: OssConfig = serde_json::from_str(raw).map_err(parse_err)?;
                if config.endpoint.trim().is_empty() {
                    return Err(MbmError::validation("OSS 存储缺少 endpoint"));
                }
                if config.bucket.trim().is_empty() {
                    return Err(MbmError::validation("OSS 存储缺少 bucket"));
                }
                Ok(StorageParams::Oss(config))
            }
            StorageKind::Ssh => {
                let config: SshStorageConfig = serde_json::from_str(raw).map_err(parse_err)?;
                config.auth.validate()?;
                Ok(StorageParams::Ssh(config))
            }
        }
    }
}

/// 根据存储实体构造后端实例。实例不跨执行缓存，
/// 每次使用时新建，以便随时反映最新配置。
pub fn create_backend(storage: &Storage) -> Result<Arc<dyn StorageBackend>> {
    let params = StorageParams::parse(storage.storage_type, &storage.config)?;

    Ok(match params {
        StorageParams::Local(config) => Arc::new(LocalStorage::new(config)?),
        StorageParams::Nas(config) => Arc::new(NasStorage::new(config)?),
        StorageParams::S3(config) => Arc::new(S3Storage::new(config)),
        StorageParams::Oss(config) => Arc::new(OssStorage::new(config)?),
        StorageParams::Ssh(config) => Arc::new(SshStorage::new(config)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_missing_required_fields() {
        assert!(StorageParams::parse(StorageKind::Nas, "{}").is_err());
        assert!(StorageParams::parse(StorageKind::S3, r#"{"region":"cn-north-1"}"#).is_err());
        assert!(StorageParams::parse(StorageKind::Oss, r#"{"bucket":"backups"}"#).is_err());
        assert!(
            StorageParams::parse(StorageKind::Ssh, r#"{"host":"10.0.0.8","username":"root"}"#)
                .is_err()
        );
        assert!(StorageParams::parse(StorageKind::Local, "not json").is_err());
    }

    #[test]
    fn test_parse_applies_defaults() {
        let StorageParams::Local(local) = StorageParams::parse(StorageKind::Local, "").unwrap()
        else {
            panic!("应解析为本地存储");
        };
        assert_eq!(local.base_path, "./data/backups");

        let StorageParams::S3(s3) =
            StorageParams::parse(StorageKind::S3, r#"{"bucket":"backups"}"#).unwrap()
        else {
            panic!("应解析为S3存储");
        };
        assert_eq!(s3.region, "us-east-1");

        let StorageParams::Ssh(ssh) = StorageParams::parse(
            StorageKind::Ssh,
            r#"{"host":"10.0.0.8","username":"root","password":"pw"}"#,
        )
        .unwrap() else {
            panic!("应解析为SSH存储");
        };
        assert_eq!(ssh.base_path, "/data/backups");
        assert_eq!(ssh.auth.port, 22);
    }
}
