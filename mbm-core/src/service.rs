// 备份编排服务
//
// 一次任务执行的完整管道：任务锁 -> 加载主机/存储 -> 落 running 日志
// -> 独占工作目录 -> 备份产出 -> 上传存储 -> 终态日志 -> 保留策略清理
// -> 通知派发。工作目录在任何退出路径上都会被删除。

use crate::backup::{self, BackupParams};
use crate::db::Database;
use crate::lock::TaskLockRegistry;
use crate::model::{BackupLog, Host, LogStatus, Storage, Task};
use crate::notification::{self, BackupNotification};
use crate::storage::{self, StorageParams};
use crate::{MbmError, Result};
use chrono::{Duration, Utc};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

/// 备份服务
#[derive(Clone)]
pub struct BackupService {
    db: Database,
    locks: TaskLockRegistry,
    /// 本地临时工作目录根
    tmp_dir: PathBuf,
}

impl BackupService {
    pub fn new(db: Database, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            locks: TaskLockRegistry::new(),
            tmp_dir: tmp_dir.into(),
        }
    }

    pub fn locks(&self) -> &TaskLockRegistry {
        &self.locks
    }

    /// 执行一次备份任务
    pub async fn execute_backup(&self, task: &Task) -> Result<()> {
        // 任务锁在任何副作用之前获取；拿不到立即拒绝，不落日志不发通知
        let _guard = self
            .locks
            .try_acquire(task.id)
            .ok_or(MbmError::TaskAlreadyRunning)?;

        info!(task = %task.name, task_id = task.id, "开始执行备份任务");
        let start_time = Utc::now();

        let mut log = BackupLog {
            id: 0,
            task_id: task.id,
            task_name: task.name.clone(),
            host_name: String::new(),
            databases: task.databases.clone(),
            backup_type: task.backup_type.to_string(),
            status: LogStatus::Running,
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
            created_at: start_time,
        };

        // 加载主机与存储并预校验存储配置；这一步失败只留一条失败日志
        let (host, storage) = match self.load_run_context(task).await {
            Ok(context) => context,
            Err(e) => {
                self.finish_failed(task, log, &e).await;
                return Err(e);
            }
        };
        log.host_name = host.name.clone();
        log.storage_type = storage.storage_type.to_string();
        log.storage_name = storage.name.clone();

        // 先落 running 日志行，保证部分失败也可观测
        match self.db.create_backup_log(log.clone()).await {
            Ok(id) => log.id = id,
            Err(e) => warn!(error = %e, "创建备份日志失败"),
        }

        let outcome = self.perform_backup(task, &host, &storage, &mut log).await;

        let end_time = Utc::now();
        log.end_time = Some(end_time);
        log.duration = (end_time - start_time).num_seconds();

        match outcome {
            Ok(()) => {
                log.status = LogStatus::Success;
                if let Err(e) = self.db.update_backup_log(log.clone()).await {
                    warn!(error = %e, "更新备份日志失败");
                }

                if let Err(e) = self.db.update_task_last_run(task.id, end_time).await {
                    warn!(error = %e, "更新任务最近执行时间失败");
                }

                self.cleanup_expired_backups(task, &storage).await;

                if task.notify_on_success {
                    self.dispatch_notifications(task, &log).await;
                }

                info!(task = %task.name, duration = log.duration, "备份任务完成");
                Ok(())
            }
            Err(e) => {
                log.status = LogStatus::Failed;
                log.error_message = e.to_string();
                // 失败的执行不保留产物信息
                log.file_path.clear();
                log.file_size = 0;
                if let Err(update_err) = self.db.update_backup_log(log.clone()).await {
                    warn!(error = %update_err, "更新备份日志失败");
                }

                if task.notify_on_failure {
                    self.dispatch_notifications(task, &log).await;
                }

                error!(task = %task.name, error = %e, "备份任务失败");
                Err(e)
            }
        }
    }

    async fn load_run_context(&self, task: &Task) -> Result<(Host, Storage)> {
        let host = self
            .db
            .get_host(task.host_id)
            .await?
            .ok_or_else(|| MbmError::not_found(format!("主机 {} 不存在", task.host_id)))?;

        let storage = self
            .db
            .get_storage(task.storage_id)
            .await?
            .ok_or_else(|| MbmError::not_found(format!("存储 {} 不存在", task.storage_id)))?;

        // 存储配置先行校验，不把失败拖到上传阶段
        StorageParams::parse(storage.storage_type, &storage.config)?;

        Ok((host, storage))
    }

    /// 备份产出与上传；产物路径等信息写回日志
    async fn perform_backup(
        &self,
        task: &Task,
        host: &Host,
        storage: &Storage,
        log: &mut BackupLog,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.tmp_dir).await?;

        // 本次执行独占的工作目录，离开作用域即被清理
        let workspace = tempfile::Builder::new()
            .prefix(&format!("backup_{}_", task.id))
            .tempdir_in(&self.tmp_dir)?;

        let params = BackupParams {
            host: host.host.clone(),
            port: host.port,
            username: host.username.clone(),
            password: host.password.clone(),
            databases: task.database_list()?,
            output_dir: workspace.path().to_path_buf(),
            options: task.backup_options.clone(),
            compression: task.compression_type,
        };

        let executor = backup::executor_for(task.backup_type);
        executor.validate(&params)?;

        let backup_started = Instant::now();
        let result = executor.execute(&params).await?;
        log.backup_time = backup_started.elapsed().as_secs() as i64;
        log.command = result.command.clone();

        let backend = storage::create_backend(storage)?;
        let file_name = result
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| MbmError::custom("无法取得产物文件名"))?;
        // 按任务ID划分存储命名空间，同一主机的多个任务互不干扰
        let remote_path = format!("task_{}/{}", task.id, file_name);

        let transfer_started = Instant::now();
        backend.upload(&result.file_path, &remote_path).await?;
        log.transfer_time = transfer_started.elapsed().as_secs() as i64;

        log.file_path = remote_path;
        log.file_size = result.file_size as i64;
        Ok(())
    }

    /// 第2步失败时的收尾：直接落一条终态失败日志
    async fn finish_failed(&self, task: &Task, mut log: BackupLog, error: &MbmError) {
        let end_time = Utc::now();
        log.status = LogStatus::Failed;
        log.end_time = Some(end_time);
        log.duration = (end_time - log.start_time).num_seconds();
        log.error_message = error.to_string();

        match self.db.create_backup_log(log.clone()).await {
            Ok(id) => log.id = id,
            Err(e) => warn!(error = %e, "创建备份日志失败"),
        }

        if task.notify_on_failure {
            self.dispatch_notifications(task, &log).await;
        }

        error!(task = %task.name, error = %error, "备份任务失败");
    }

    /// 保留策略清理：删除窗口外的成功备份及其日志。
    /// 单个产物删除失败只记录，不中断剩余条目的清理。
    async fn cleanup_expired_backups(&self, task: &Task, storage: &Storage) {
        if task.retention_days <= 0 {
            return;
        }

        let cutoff = Utc::now() - Duration::days(task.retention_days);
        let expired = match self.db.find_expired_logs(task.id, cutoff).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(task_id = task.id, error = %e, "查询过期备份失败");
                return;
            }
        };
        if expired.is_empty() {
            return;
        }

        let backend = match storage::create_backend(storage) {
            Ok(backend) => backend,
            Err(e) => {
                warn!(task_id = task.id, error = %e, "构造存储后端失败，跳过本轮清理");
                return;
            }
        };

        let mut cleaned = 0usize;
        for log in expired {
            if !log.file_path.is_empty() {
                if let Err(e) = backend.delete(&log.file_path).await {
                    warn!(file = %log.file_path, error = %e, "删除过期备份文件失败");
                }
            }

            if let Err(e) = self.db.delete_backup_log(log.id).await {
                warn!(log_id = log.id, error = %e, "删除过期备份日志失败");
            } else {
                cleaned += 1;
            }
        }

        info!(task = %task.name, cleaned, "过期备份清理完成");
    }

    /// 把执行结果派发到任务配置的所有通知渠道
    async fn dispatch_notifications(&self, task: &Task, log: &BackupLog) {
        let channel_ids = match task.notification_id_list() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(task = %task.name, error = %e, "通知渠道列表解析失败");
                return;
            }
        };
        if channel_ids.is_empty() {
            return;
        }

        let notification = BackupNotification::from_log(log);

        for channel_id in channel_ids {
            let channel = match self.db.get_notification(channel_id).await {
                Ok(Some(channel)) => channel,
                Ok(None) => {
                    warn!(channel_id, "通知渠道不存在");
                    continue;
                }
                Err(e) => {
                    warn!(channel_id, error = %e, "加载通知渠道失败");
                    continue;
                }
            };

            let notifier = match notification::create_notifier(&channel) {
                Ok(notifier) => notifier,
                Err(e) => {
                    warn!(channel = %channel.name, error = %e, "构造通知器失败");
                    continue;
                }
            };

            match notifier.send(&notification).await {
                Ok(()) => info!(channel = %channel.name, "通知发送成功"),
                Err(e) => warn!(channel = %channel.name, error = %e, "通知发送失败"),
            }
        }
    }
}
