use crate::{MbmError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 存储目标实体，核心只读；每次使用时据此构造存储后端实例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    pub id: i64,
    pub name: String,
    pub storage_type: StorageKind,
    /// JSON 格式的后端配置，在构造后端实例时解析
    pub config: String,
    pub created_at: DateTime<Utc>,
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Nas,
    S3,
    Oss,
    Ssh,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::Nas => "nas",
            StorageKind::S3 => "s3",
            StorageKind::Oss => "oss",
            StorageKind::Ssh => "ssh",
        }
    }
}

impl FromStr for StorageKind {
    type Err = MbmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(StorageKind::Local),
            "nas" => Ok(StorageKind::Nas),
            "s3" => Ok(StorageKind::S3),
            "oss" => Ok(StorageKind::Oss),
            "ssh" => Ok(StorageKind::Ssh),
            other => Err(MbmError::validation(format!("不支持的存储类型: {other}"))),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
