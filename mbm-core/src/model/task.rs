use crate::{MbmError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 备份任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub host_id: i64,
    /// JSON 数组，要备份的数据库列表；空表示全部数据库
    pub databases: String,
    pub backup_type: BackupType,
    pub schedule_type: ScheduleType,
    /// JSON 格式的调度配置，在任务注册时解析
    pub schedule_config: String,
    pub storage_id: i64,
    /// 保留天数，0 表示永久保留
    pub retention_days: i64,
    /// JSON 数组，通知渠道ID列表
    pub notification_ids: String,
    pub notify_on_success: bool,
    pub notify_on_failure: bool,
    /// 引擎相关的额外选项（mysqldump/mydumper 为命令行参数串，
    /// xtrabackup 为 JSON，含 SSH 配置）
    pub backup_options: String,
    pub compression_type: CompressionType,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// 解析要备份的数据库列表
    pub fn database_list(&self) -> Result<Vec<String>> {
        if self.databases.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&self.databases)?)
    }

    /// 解析通知渠道ID列表
    pub fn notification_id_list(&self) -> Result<Vec<i64>> {
        if self.notification_ids.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&self.notification_ids)?)
    }
}

/// 备份引擎类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Mysqldump,
    Mydumper,
    Xtrabackup,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Mysqldump => "mysqldump",
            BackupType::Mydumper => "mydumper",
            BackupType::Xtrabackup => "xtrabackup",
        }
    }
}

impl FromStr for BackupType {
    type Err = MbmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mysqldump" => Ok(BackupType::Mysqldump),
            "mydumper" => Ok(BackupType::Mydumper),
            "xtrabackup" => Ok(BackupType::Xtrabackup),
            other => Err(MbmError::validation(format!("不支持的备份类型: {other}"))),
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 调度类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Once,
    Daily,
    Weekly,
    Monthly,
    Cron,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Once => "once",
            ScheduleType::Daily => "daily",
            ScheduleType::Weekly => "weekly",
            ScheduleType::Monthly => "monthly",
            ScheduleType::Cron => "cron",
        }
    }
}

impl FromStr for ScheduleType {
    type Err = MbmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "once" => Ok(ScheduleType::Once),
            "daily" => Ok(ScheduleType::Daily),
            "weekly" => Ok(ScheduleType::Weekly),
            "monthly" => Ok(ScheduleType::Monthly),
            "cron" => Ok(ScheduleType::Cron),
            other => Err(MbmError::schedule(format!("不支持的调度类型: {other}"))),
        }
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 压缩方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    Gzip,
    Zip,
}

impl CompressionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Gzip => "gzip",
            CompressionType::Zip => "zip",
        }
    }
}

impl FromStr for CompressionType {
    type Err = MbmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(CompressionType::None),
            "gzip" => Ok(CompressionType::Gzip),
            "zip" => Ok(CompressionType::Zip),
            other => Err(MbmError::validation(format!("不支持的压缩方式: {other}"))),
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
