use crate::model::{BackupLog, Host, NotificationChannel, Storage, Task};
use crate::{MbmError, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

use super::actor::DuckDbActor;
use super::messages::DbMessage;

/// 数据库句柄，可克隆；所有操作经消息转发给单线程Actor执行
#[derive(Debug, Clone)]
pub struct Database {
    sender: mpsc::Sender<DbMessage>,
}

impl Database {
    /// 打开（或创建）数据库文件
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据库文件的父目录存在
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (sender, receiver) = mpsc::channel(100);

        let actor = DuckDbActor::new(db_path)?;
        tokio::spawn(actor.run(receiver));

        let database = Self { sender };
        database.init_tables().await?;

        Ok(database)
    }

    /// 创建内存数据库（测试用）
    pub async fn connect_memory() -> Result<Self> {
        let (sender, receiver) = mpsc::channel(100);

        let actor = DuckDbActor::new_memory()?;
        tokio::spawn(actor.run(receiver));

        let database = Self { sender };
        database.init_tables().await?;

        Ok(database)
    }

    /// 发送消息并等待Actor响应
    async fn call<T>(
        &self,
        make_message: impl FnOnce(oneshot::Sender<Result<T>>) -> DbMessage,
    ) -> Result<T> {
        let (respond_to, receiver) = oneshot::channel();

        self.sender
            .send(make_message(respond_to))
            .await
            .map_err(|_| MbmError::custom("数据库Actor已关闭"))?;

        receiver
            .await
            .map_err(|_| MbmError::custom("等待数据库响应失败"))?
    }

    async fn init_tables(&self) -> Result<()> {
        self.call(|respond_to| DbMessage::InitTables { respond_to })
            .await
    }

    // ---- 任务 ----

    pub async fn create_task(&self, task: Task) -> Result<i64> {
        self.call(|respond_to| DbMessage::CreateTask { task, respond_to })
            .await
    }

    pub async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        self.call(|respond_to| DbMessage::GetTask { id, respond_to })
            .await
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.call(|respond_to| DbMessage::ListTasks { respond_to })
            .await
    }

    pub async fn list_enabled_tasks(&self) -> Result<Vec<Task>> {
        self.call(|respond_to| DbMessage::ListEnabledTasks { respond_to })
            .await
    }

    pub async fn set_task_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        self.call(|respond_to| DbMessage::SetTaskEnabled {
            id,
            enabled,
            respond_to,
        })
        .await
    }

    pub async fn update_task_last_run(&self, id: i64, last_run_at: DateTime<Utc>) -> Result<()> {
        self.call(|respond_to| DbMessage::UpdateTaskLastRun {
            id,
            last_run_at,
            respond_to,
        })
        .await
    }

    pub async fn update_task_next_run(
        &self,
        id: i64,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.call(|respond_to| DbMessage::UpdateTaskNextRun {
            id,
            next_run_at,
            respond_to,
        })
        .await
    }

    // ---- 主机 ----

    pub async fn create_host(&self, host: Host) -> Result<i64> {
        self.call(|respond_to| DbMessage::CreateHost { host, respond_to })
            .await
    }

    pub async fn get_host(&self, id: i64) -> Result<Option<Host>> {
        self.call(|respond_to| DbMessage::GetHost { id, respond_to })
            .await
    }

    // ---- 存储 ----

    pub async fn create_storage(&self, storage: Storage) -> Result<i64> {
        self.call(|respond_to| DbMessage::CreateStorage {
            storage,
            respond_to,
        })
        .await
    }

    pub async fn get_storage(&self, id: i64) -> Result<Option<Storage>> {
        self.call(|respond_to| DbMessage::GetStorage { id, respond_to })
            .await
    }

    // ---- 通知渠道 ----

    pub async fn create_notification(&self, channel: NotificationChannel) -> Result<i64> {
        self.call(|respond_to| DbMessage::CreateNotification {
            channel,
            respond_to,
        })
        .await
    }

    pub async fn get_notification(&self, id: i64) -> Result<Option<NotificationChannel>> {
        self.call(|respond_to| DbMessage::GetNotification { id, respond_to })
            .await
    }

    // ---- 备份日志 ----

    pub async fn create_backup_log(&self, log: BackupLog) -> Result<i64> {
        self.call(|respond_to| DbMessage::CreateBackupLog { log, respond_to })
            .await
    }

    pub async fn update_backup_log(&self, log: BackupLog) -> Result<()> {
        self.call(|respond_to| DbMessage::UpdateBackupLog { log, respond_to })
            .await
    }

    pub async fn get_backup_log(&self, id: i64) -> Result<Option<BackupLog>> {
        self.call(|respond_to| DbMessage::GetBackupLog { id, respond_to })
            .await
    }

    pub async fn list_backup_logs(&self, task_id: Option<i64>) -> Result<Vec<BackupLog>> {
        self.call(|respond_to| DbMessage::ListBackupLogs {
            task_id,
            respond_to,
        })
        .await
    }

    /// 查询指定任务中早于 cutoff 的成功日志（保留策略清理用）
    pub async fn find_expired_logs(
        &self,
        task_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BackupLog>> {
        self.call(|respond_to| DbMessage::FindExpiredLogs {
            task_id,
            cutoff,
            respond_to,
        })
        .await
    }

    pub async fn delete_backup_log(&self, id: i64) -> Result<()> {
        self.call(|respond_to| DbMessage::DeleteBackupLog { id, respond_to })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackupType, CompressionType, LogStatus, ScheduleType};
    use chrono::Duration;

    fn sample_task() -> Task {
        Task {
            id: 0,
            name: "nightly".to_string(),
            host_id: 1,
            databases: r#"["app"]"#.to_string(),
            backup_type: BackupType::Mysqldump,
            schedule_type: ScheduleType::Daily,
            schedule_config: r#"{"time":"02:00"}"#.to_string(),
            storage_id: 1,
            retention_days: 7,
            notification_ids: String::new(),
            notify_on_success: false,
            notify_on_failure: true,
            backup_options: String::new(),
            compression_type: CompressionType::Gzip,
            enabled: true,
            last_run_at: None,
            next_run_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_log(task_id: i64, status: LogStatus, start_time: DateTime<Utc>) -> BackupLog {
        BackupLog {
            id: 0,
            task_id,
            task_name: "nightly".to_string(),
            host_name: "db-1".to_string(),
            databases: r#"["app"]"#.to_string(),
            backup_type: "mysqldump".to_string(),
            status,
            start_time,
            end_time: None,
            duration: 0,
            backup_time: 0,
            transfer_time: 0,
            file_path: String::new(),
            file_size: 0,
            storage_type: String::new(),
            storage_name: String::new(),
            command: String::new(),
            error_message: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_task_roundtrip() {
        let db = Database::connect_memory().await.unwrap();

        let id = db.create_task(sample_task()).await.unwrap();
        let task = db.get_task(id).await.unwrap().expect("任务应存在");
        assert_eq!(task.name, "nightly");
        assert_eq!(task.backup_type, BackupType::Mysqldump);
        assert!(task.enabled);
        assert!(task.last_run_at.is_none());

        let now = Utc::now();
        db.update_task_last_run(id, now).await.unwrap();
        db.update_task_next_run(id, Some(now + Duration::days(1)))
            .await
            .unwrap();
        let task = db.get_task(id).await.unwrap().unwrap();
        assert!(task.last_run_at.is_some());
        assert!(task.next_run_at.is_some());

        db.set_task_enabled(id, false).await.unwrap();
        assert!(db.list_enabled_tasks().await.unwrap().is_empty());
        assert_eq!(db.list_tasks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_log_query_only_matches_old_success() {
        let db = Database::connect_memory().await.unwrap();
        let now = Utc::now();

        // 过期的成功日志
        let old_success = sample_log(1, LogStatus::Success, now - Duration::days(30));
        let old_id = db.create_backup_log(old_success).await.unwrap();

        // 过期但失败的日志，不应被清理
        db.create_backup_log(sample_log(1, LogStatus::Failed, now - Duration::days(30)))
            .await
            .unwrap();

        // 窗口内的成功日志，不应被清理
        db.create_backup_log(sample_log(1, LogStatus::Success, now - Duration::days(1)))
            .await
            .unwrap();

        // 其他任务的过期成功日志
        db.create_backup_log(sample_log(2, LogStatus::Success, now - Duration::days(30)))
            .await
            .unwrap();

        let cutoff = now - Duration::days(7);
        let expired = db.find_expired_logs(1, cutoff).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old_id);

        db.delete_backup_log(old_id).await.unwrap();
        assert!(db.find_expired_logs(1, cutoff).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_terminal_update() {
        let db = Database::connect_memory().await.unwrap();
        let start = Utc::now();

        let mut log = sample_log(1, LogStatus::Running, start);
        let id = db.create_backup_log(log.clone()).await.unwrap();
        log.id = id;

        let end = start + Duration::seconds(42);
        log.status = LogStatus::Success;
        log.end_time = Some(end);
        log.duration = 42;
        log.file_path = "task_1/backup_20260101_020000.sql.gz".to_string();
        log.file_size = 1024;
        db.update_backup_log(log).await.unwrap();

        let stored = db.get_backup_log(id).await.unwrap().unwrap();
        assert_eq!(stored.status, LogStatus::Success);
        assert!(stored.end_time.is_some());
        assert_eq!(stored.duration, 42);
        assert!(!stored.file_path.is_empty());
    }
}
