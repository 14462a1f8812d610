// 通知边界
//
// 编排管道产出一份结构化的执行结果，按任务配置的渠道ID逐个派发。
// 渠道相关的消息渲染不在核心范围内；当前内置 webhook 传输，
// 其他渠道类型在工厂处显式拒绝。

mod webhook;

pub use webhook::WebhookNotifier;

use crate::model::{BackupLog, NotificationChannel, NotifyKind};
use crate::{MbmError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// 备份执行结果通知
#[derive(Debug, Clone, Serialize)]
pub struct BackupNotification {
    pub task_name: String,
    pub host_name: String,
    pub databases: Vec<String>,
    pub backup_type: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// 总耗时（秒）
    pub duration: i64,
    /// 产物大小（字节）
    pub file_size: i64,
    pub error_message: String,
}

impl BackupNotification {
    pub fn from_log(log: &BackupLog) -> Self {
        let databases = serde_json::from_str(&log.databases).unwrap_or_default();

        Self {
            task_name: log.task_name.clone(),
            host_name: log.host_name.clone(),
            databases,
            backup_type: log.backup_type.clone(),
            status: log.status.to_string(),
            start_time: log.start_time,
            end_time: log.end_time,
            duration: log.duration,
            file_size: log.file_size,
            error_message: log.error_message.clone(),
        }
    }
}

/// 通知发送接口
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &BackupNotification) -> Result<()>;
}

/// 根据渠道实体构造通知器
pub fn create_notifier(channel: &NotificationChannel) -> Result<Arc<dyn Notifier>> {
    match channel.notify_type {
        NotifyKind::Webhook => Ok(Arc::new(WebhookNotifier::from_config(&channel.config)?)),
        other => Err(MbmError::Notify(format!("暂不支持的通知类型: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogStatus;

    #[test]
    fn test_notification_from_log() {
        let start = Utc::now();
        let log = BackupLog {
            id: 1,
            task_id: 1,
            task_name: "nightly".to_string(),
            host_name: "db-1".to_string(),
            databases: r#"["app","auth"]"#.to_string(),
            backup_type: "mysqldump".to_string(),
            status: LogStatus::Success,
            start_time: start,
            end_time: Some(start),
            duration: 42,
            backup_time: 30,
            transfer_time: 12,
            file_path: "task_1/backup.sql.gz".to_string(),
            file_size: 1024,
            storage_type: "local".to_string(),
            storage_name: "默认存储".to_string(),
            command: "mysqldump --password=***".to_string(),
            error_message: String::new(),
            created_at: start,
        };

        let notification = BackupNotification::from_log(&log);
        assert_eq!(notification.status, "success");
        assert_eq!(notification.databases, vec!["app", "auth"]);
        assert_eq!(notification.duration, 42);

        // 无法解析的数据库快照退化为空列表，不影响通知发送
        let mut broken = log.clone();
        broken.databases = "oops".to_string();
        assert!(BackupNotification::from_log(&broken).databases.is_empty());
    }
}
