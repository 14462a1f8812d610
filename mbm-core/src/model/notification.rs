use crate::{MbmError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 通知渠道实体，核心只读
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: i64,
    pub name: String,
    pub notify_type: NotifyKind,
    /// JSON 格式的渠道配置
    pub config: String,
    pub created_at: DateTime<Utc>,
}

/// 通知渠道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    Webhook,
    Email,
    Dingtalk,
    Wecom,
}

impl NotifyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyKind::Webhook => "webhook",
            NotifyKind::Email => "email",
            NotifyKind::Dingtalk => "dingtalk",
            NotifyKind::Wecom => "wecom",
        }
    }
}

impl FromStr for NotifyKind {
    type Err = MbmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "webhook" => Ok(NotifyKind::Webhook),
            "email" => Ok(NotifyKind::Email),
            "dingtalk" => Ok(NotifyKind::Dingtalk),
            "wecom" => Ok(NotifyKind::Wecom),
            other => Err(MbmError::validation(format!("不支持的通知类型: {other}"))),
        }
    }
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
