use crate::Result;
use crate::model::{BackupLog, Host, NotificationChannel, Storage, Task};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

/// 数据库Actor消息
pub enum DbMessage {
    InitTables {
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ---- 任务 ----
    CreateTask {
        task: Task,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    GetTask {
        id: i64,
        respond_to: oneshot::Sender<Result<Option<Task>>>,
    },
    ListTasks {
        respond_to: oneshot::Sender<Result<Vec<Task>>>,
    },
    ListEnabledTasks {
        respond_to: oneshot::Sender<Result<Vec<Task>>>,
    },
    SetTaskEnabled {
        id: i64,
        enabled: bool,
        respond_to: oneshot::Sender<Result<()>>,
    },
    UpdateTaskLastRun {
        id: i64,
        last_run_at: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    UpdateTaskNextRun {
        id: i64,
        next_run_at: Option<DateTime<Utc>>,
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ---- 主机 ----
    CreateHost {
        host: Host,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    GetHost {
        id: i64,
        respond_to: oneshot::Sender<Result<Option<Host>>>,
    },

    // ---- 存储 ----
    CreateStorage {
        storage: Storage,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    GetStorage {
        id: i64,
        respond_to: oneshot::Sender<Result<Option<Storage>>>,
    },

    // ---- 通知渠道 ----
    CreateNotification {
        channel: NotificationChannel,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    GetNotification {
        id: i64,
        respond_to: oneshot::Sender<Result<Option<NotificationChannel>>>,
    },

    // ---- 备份日志 ----
    CreateBackupLog {
        log: BackupLog,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    UpdateBackupLog {
        log: BackupLog,
        respond_to: oneshot::Sender<Result<()>>,
    },
    GetBackupLog {
        id: i64,
        respond_to: oneshot::Sender<Result<Option<BackupLog>>>,
    },
    ListBackupLogs {
        task_id: Option<i64>,
        respond_to: oneshot::Sender<Result<Vec<BackupLog>>>,
    },
    FindExpiredLogs {
        task_id: i64,
        cutoff: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<Vec<BackupLog>>>,
    },
    DeleteBackupLog {
        id: i64,
        respond_to: oneshot::Sender<Result<()>>,
    },
}
