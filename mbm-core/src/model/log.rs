use crate::{MbmError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 备份日志，一次执行尝试对应一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupLog {
    pub id: i64,
    pub task_id: i64,
    pub task_name: String,
    pub host_name: String,
    pub databases: String,
    pub backup_type: String,
    pub status: LogStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// 总耗时（秒）
    pub duration: i64,
    /// 备份阶段耗时（秒）
    pub backup_time: i64,
    /// 传输阶段耗时（秒）
    pub transfer_time: i64,
    /// 成功时为存储侧相对路径
    pub file_path: String,
    /// 字节
    pub file_size: i64,
    pub storage_type: String,
    pub storage_name: String,
    /// 脱敏后的备份命令
    pub command: String,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}

/// 日志状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Running,
    Success,
    Failed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Running => "running",
            LogStatus::Success => "success",
            LogStatus::Failed => "failed",
        }
    }
}

impl FromStr for LogStatus {
    type Err = MbmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(LogStatus::Running),
            "success" => Ok(LogStatus::Success),
            "failed" => Ok(LogStatus::Failed),
            other => Err(MbmError::custom(format!("未知的日志状态: {other}"))),
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
