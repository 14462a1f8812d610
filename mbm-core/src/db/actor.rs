use crate::Result;
use crate::model::{BackupLog, Host, NotificationChannel, Storage, Task};
use chrono::{DateTime, Utc};
use duckdb::{Connection, Row, params};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::DbMessage;

/// DuckDB Actor - 确保单线程访问DuckDB
pub struct DuckDbActor {
    connection: Connection,
}

impl DuckDbActor {
    /// 创建新的DuckDB Actor
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let connection = Connection::open(db_path)?;
        Ok(Self { connection })
    }

    /// 创建内存DuckDB Actor
    pub fn new_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    /// 运行Actor消息循环
    pub async fn run(mut self, mut receiver: mpsc::Receiver<DbMessage>) {
        info!("DuckDB Actor 已启动");

        while let Some(message) = receiver.recv().await {
            self.handle_message(message);
        }

        info!("DuckDB Actor 已关闭");
    }

    /// 处理数据库消息
    fn handle_message(&mut self, message: DbMessage) {
        match message {
            DbMessage::InitTables { respond_to } => {
                let _ = respond_to.send(self.init_tables());
            }
            DbMessage::CreateTask { task, respond_to } => {
                let _ = respond_to.send(self.create_task(&task));
            }
            DbMessage::GetTask { id, respond_to } => {
                let _ = respond_to.send(self.get_task(id));
            }
            DbMessage::ListTasks { respond_to } => {
                let _ = respond_to.send(self.list_tasks(false));
            }
            DbMessage::ListEnabledTasks { respond_to } => {
                let _ = respond_to.send(self.list_tasks(true));
            }
            DbMessage::SetTaskEnabled {
                id,
                enabled,
                respond_to,
            } => {
                let _ = respond_to.send(self.set_task_enabled(id, enabled));
            }
            DbMessage::UpdateTaskLastRun {
                id,
                last_run_at,
                respond_to,
            } => {
                let _ = respond_to.send(self.update_task_last_run(id, last_run_at));
            }
            DbMessage::UpdateTaskNextRun {
                id,
                next_run_at,
                respond_to,
            } => {
                let _ = respond_to.send(self.update_task_next_run(id, next_run_at));
            }
            DbMessage::CreateHost { host, respond_to } => {
                let _ = respond_to.send(self.create_host(&host));
            }
            DbMessage::GetHost { id, respond_to } => {
                let _ = respond_to.send(self.get_host(id));
            }
            DbMessage::CreateStorage {
                storage,
                respond_to,
            } => {
                let _ = respond_to.send(self.create_storage(&storage));
            }
            DbMessage::GetStorage { id, respond_to } => {
                let _ = respond_to.send(self.get_storage(id));
            }
            DbMessage::CreateNotification {
                channel,
                respond_to,
            } => {
                let _ = respond_to.send(self.create_notification(&channel));
            }
            DbMessage::GetNotification { id, respond_to } => {
                let _ = respond_to.send(self.get_notification(id));
            }
            DbMessage::CreateBackupLog { log, respond_to } => {
                let _ = respond_to.send(self.create_backup_log(&log));
            }
            DbMessage::UpdateBackupLog { log, respond_to } => {
                let _ = respond_to.send(self.update_backup_log(&log));
            }
            DbMessage::GetBackupLog { id, respond_to } => {
                let _ = respond_to.send(self.get_backup_log(id));
            }
            DbMessage::ListBackupLogs {
                task_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.list_backup_logs(task_id));
            }
            DbMessage::FindExpiredLogs {
                task_id,
                cutoff,
                respond_to,
            } => {
                let _ = respond_to.send(self.find_expired_logs(task_id, cutoff));
            }
            DbMessage::DeleteBackupLog { id, respond_to } => {
                let _ = respond_to.send(self.delete_backup_log(id));
            }
        }
    }

    /// 初始化数据库表
    fn init_tables(&mut self) -> Result<()> {
        debug!("正在初始化DuckDB表...");

        // 读取并执行SQL初始化脚本
        let sql_content = include_str!("../../migrations/init_duckdb.sql");

        // 按分号分割SQL语句并执行
        for statement in sql_content.split(';').filter(|s| !s.trim().is_empty()) {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                self.connection.execute(trimmed, [])?;
            }
        }

        info!("DuckDB表初始化完成");
        Ok(())
    }

    // ---- 任务 ----

    const TASK_COLUMNS: &'static str = "id, name, host_id, databases, backup_type, schedule_type, \
         schedule_config, storage_id, retention_days, notification_ids, notify_on_success, \
         notify_on_failure, backup_options, compression_type, enabled, last_run_at, next_run_at, \
         created_at, updated_at";

    fn create_task(&mut self, task: &Task) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO tasks (name, host_id, databases, backup_type, schedule_type, \
             schedule_config, storage_id, retention_days, notification_ids, notify_on_success, \
             notify_on_failure, backup_options, compression_type, enabled) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                task.name,
                task.host_id,
                task.databases,
                task.backup_type.as_str(),
                task.schedule_type.as_str(),
                task.schedule_config,
                task.storage_id,
                task.retention_days,
                task.notification_ids,
                task.notify_on_success,
                task.notify_on_failure,
                task.backup_options,
                task.compression_type.as_str(),
                task.enabled,
            ],
        )?;

        let id: i64 = self
            .connection
            .query_row("SELECT currval('task_id_seq')", [], |row| row.get(0))?;
        Ok(id)
    }

    fn get_task(&mut self, id: i64) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?", Self::TASK_COLUMNS);
        let mut stmt = self.connection.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;

        match rows.next()? {
            Some(row) => Ok(Some(row_to_task(row)?)),
            None => Ok(None),
        }
    }

    fn list_tasks(&mut self, enabled_only: bool) -> Result<Vec<Task>> {
        let sql = if enabled_only {
            format!(
                "SELECT {} FROM tasks WHERE enabled = true ORDER BY id",
                Self::TASK_COLUMNS
            )
        } else {
            format!("SELECT {} FROM tasks ORDER BY id", Self::TASK_COLUMNS)
        };

        let mut stmt = self.connection.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(row_to_task(row)?);
        }
        Ok(tasks)
    }

    fn set_task_enabled(&mut self, id: i64, enabled: bool) -> Result<()> {
        self.connection.execute(
            "UPDATE tasks SET enabled = ?, updated_at = current_timestamp WHERE id = ?",
            params![enabled, id],
        )?;
        Ok(())
    }

    fn update_task_last_run(&mut self, id: i64, last_run_at: DateTime<Utc>) -> Result<()> {
        self.connection.execute(
            "UPDATE tasks SET last_run_at = ? WHERE id = ?",
            params![last_run_at, id],
        )?;
        Ok(())
    }

    fn update_task_next_run(&mut self, id: i64, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        self.connection.execute(
            "UPDATE tasks SET next_run_at = ? WHERE id = ?",
            params![next_run_at, id],
        )?;
        Ok(())
    }

    // ---- 主机 ----

    fn create_host(&mut self, host: &Host) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO hosts (name, host, port, username, password, description) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                host.name,
                host.host,
                host.port as i64,
                host.username,
                host.password,
                host.description,
            ],
        )?;

        let id: i64 = self
            .connection
            .query_row("SELECT currval('host_id_seq')", [], |row| row.get(0))?;
        Ok(id)
    }

    fn get_host(&mut self, id: i64) -> Result<Option<Host>> {
        let mut stmt = self.connection.prepare(
            "SELECT id, name, host, port, username, password, description, created_at \
             FROM hosts WHERE id = ?",
        )?;
        let mut rows = stmt.query(params![id])?;

        match rows.next()? {
            Some(row) => {
                let port: i64 = row.get(3)?;
                Ok(Some(Host {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    host: row.get(2)?,
                    port: port as u16,
                    username: row.get(4)?,
                    password: row.get(5)?,
                    description: row.get(6)?,
                    created_at: row.get(7)?,
                }))
            }
            None => Ok(None),
        }
    }

    // ---- 存储 ----

    fn create_storage(&mut self, storage: &Storage) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO storages (name, storage_type, config) VALUES (?, ?, ?)",
            params![storage.name, storage.storage_type.as_str(), storage.config],
        )?;

        let id: i64 = self
            .connection
            .query_row("SELECT currval('storage_id_seq')", [], |row| row.get(0))?;
        Ok(id)
    }

    fn get_storage(&mut self, id: i64) -> Result<Option<Storage>> {
        let mut stmt = self.connection.prepare(
            "SELECT id, name, storage_type, config, created_at FROM storages WHERE id = ?",
        )?;
        let mut rows = stmt.query(params![id])?;

        match rows.next()? {
            Some(row) => {
                let storage_type: String = row.get(2)?;
                Ok(Some(Storage {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    storage_type: storage_type.parse()?,
                    config: row.get(3)?,
                    created_at: row.get(4)?,
                }))
            }
            None => Ok(None),
        }
    }

    // ---- 通知渠道 ----

    fn create_notification(&mut self, channel: &NotificationChannel) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO notifications (name, notify_type, config) VALUES (?, ?, ?)",
            params![channel.name, channel.notify_type.as_str(), channel.config],
        )?;

        let id: i64 = self
            .connection
            .query_row("SELECT currval('notification_id_seq')", [], |row| {
                row.get(0)
            })?;
        Ok(id)
    }

    fn get_notification(&mut self, id: i64) -> Result<Option<NotificationChannel>> {
        let mut stmt = self.connection.prepare(
            "SELECT id, name, notify_type, config, created_at FROM notifications WHERE id = ?",
        )?;
        let mut rows = stmt.query(params![id])?;

        match rows.next()? {
            Some(row) => {
                let notify_type: String = row.get(2)?;
                Ok(Some(NotificationChannel {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    notify_type: notify_type.parse()?,
                    config: row.get(3)?,
                    created_at: row.get(4)?,
                }))
            }
            None => Ok(None),
        }
    }

    // ---- 备份日志 ----

    const LOG_COLUMNS: &'static str = "id, task_id, task_name, host_name, databases, backup_type, \
         status, start_time, end_time, duration, backup_time, transfer_time, file_path, \
         file_size, storage_type, storage_name, command, error_message, created_at";

    fn create_backup_log(&mut self, log: &BackupLog) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO backup_logs (task_id, task_name, host_name, databases, backup_type, \
             status, start_time, end_time, duration, backup_time, transfer_time, file_path, \
             file_size, storage_type, storage_name, command, error_message) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                log.task_id,
                log.task_name,
                log.host_name,
                log.databases,
                log.backup_type,
                log.status.as_str(),
                log.start_time,
                log.end_time,
                log.duration,
                log.backup_time,
                log.transfer_time,
                log.file_path,
                log.file_size,
                log.storage_type,
                log.storage_name,
                log.command,
                log.error_message,
            ],
        )?;

        let id: i64 = self
            .connection
            .query_row("SELECT currval('backup_log_id_seq')", [], |row| row.get(0))?;
        Ok(id)
    }

    fn update_backup_log(&mut self, log: &BackupLog) -> Result<()> {
        self.connection.execute(
            "UPDATE backup_logs SET status = ?, end_time = ?, duration = ?, backup_time = ?, \
             transfer_time = ?, file_path = ?, file_size = ?, storage_type = ?, \
             storage_name = ?, command = ?, error_message = ? WHERE id = ?",
            params![
                log.status.as_str(),
                log.end_time,
                log.duration,
                log.backup_time,
                log.transfer_time,
                log.file_path,
                log.file_size,
                log.storage_type,
                log.storage_name,
                log.command,
                log.error_message,
                log.id,
            ],
        )?;
        Ok(())
    }

    fn get_backup_log(&mut self, id: i64) -> Result<Option<BackupLog>> {
        let sql = format!("SELECT {} FROM backup_logs WHERE id = ?", Self::LOG_COLUMNS);
        let mut stmt = self.connection.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;

        match rows.next()? {
            Some(row) => Ok(Some(row_to_log(row)?)),
            None => Ok(None),
        }
    }

    fn list_backup_logs(&mut self, task_id: Option<i64>) -> Result<Vec<BackupLog>> {
        let mut logs = Vec::new();

        match task_id {
            Some(task_id) => {
                let sql = format!(
                    "SELECT {} FROM backup_logs WHERE task_id = ? ORDER BY start_time DESC",
                    Self::LOG_COLUMNS
                );
                let mut stmt = self.connection.prepare(&sql)?;
                let mut rows = stmt.query(params![task_id])?;
                while let Some(row) = rows.next()? {
                    logs.push(row_to_log(row)?);
                }
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM backup_logs ORDER BY start_time DESC",
                    Self::LOG_COLUMNS
                );
                let mut stmt = self.connection.prepare(&sql)?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    logs.push(row_to_log(row)?);
                }
            }
        }

        Ok(logs)
    }

    fn find_expired_logs(&mut self, task_id: i64, cutoff: DateTime<Utc>) -> Result<Vec<BackupLog>> {
        let sql = format!(
            "SELECT {} FROM backup_logs \
             WHERE task_id = ? AND status = 'success' AND start_time < ? \
             ORDER BY start_time",
            Self::LOG_COLUMNS
        );
        let mut stmt = self.connection.prepare(&sql)?;
        let mut rows = stmt.query(params![task_id, cutoff])?;

        let mut logs = Vec::new();
        while let Some(row) = rows.next()? {
            logs.push(row_to_log(row)?);
        }
        Ok(logs)
    }

    fn delete_backup_log(&mut self, id: i64) -> Result<()> {
        self.connection
            .execute("DELETE FROM backup_logs WHERE id = ?", params![id])?;
        Ok(())
    }
}

/// 将查询行转换为任务；枚举列在这里解析，非法取值直接报错
fn row_to_task(row: &Row<'_>) -> Result<Task> {
    let backup_type: String = row.get(4)?;
    let schedule_type: String = row.get(5)?;
    let compression_type: String = row.get(13)?;

    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        host_id: row.get(2)?,
        databases: row.get(3)?,
        backup_type: backup_type.parse()?,
        schedule_type: schedule_type.parse()?,
        schedule_config: row.get(6)?,
        storage_id: row.get(7)?,
        retention_days: row.get(8)?,
        notification_ids: row.get(9)?,
        notify_on_success: row.get(10)?,
        notify_on_failure: row.get(11)?,
        backup_options: row.get(12)?,
        compression_type: compression_type.parse()?,
        enabled: row.get(14)?,
        last_run_at: row.get(15)?,
        next_run_at: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

fn row_to_log(row: &Row<'_>) -> Result<BackupLog> {
    let status: String = row.get(6)?;

    Ok(BackupLog {
        id: row.get(0)?,
        task_id: row.get(1)?,
        task_name: row.get(2)?,
        host_name: row.get(3)?,
        databases: row.get(4)?,
        backup_type: row.get(5)?,
        status: status.parse()?,
        start_time: row.get(7)?,
        end_time: row.get(8)?,
        duration: row.get(9)?,
        backup_time: row.get(10)?,
        transfer_time: row.get(11)?,
        file_path: row.get(12)?,
        file_size: row.get(13)?,
        storage_type: row.get(14)?,
        storage_name: row.get(15)?,
        command: row.get(16)?,
        error_message: row.get(17)?,
        created_at: row.get(18)?,
    })
}
