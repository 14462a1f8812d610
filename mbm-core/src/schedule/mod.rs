// 调度引擎
//
// 每个启用的任务对应一个调度作业（tokio任务）。作业循环只负责等待
// 触发时刻；触发后的执行派发到独立任务上，因此移除作业或停止引擎
// 不会打断进行中的备份。任务表用读写锁保护，与任务锁注册表互不嵌套。

mod rule;

pub use rule::{ScheduleConfig, ScheduleRule};

use crate::clock::{Clock, SystemClock};
use crate::db::Database;
use crate::model::Task;
use crate::service::BackupService;
use crate::{MbmError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 调度引擎
#[derive(Clone)]
pub struct ScheduleEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    db: Database,
    service: BackupService,
    clock: Arc<dyn Clock>,
    /// 任务ID -> 调度作业
    jobs: RwLock<HashMap<i64, Job>>,
    shutdown_tx: watch::Sender<bool>,
}

struct Job {
    rule: Arc<ScheduleRule>,
    handle: JoinHandle<()>,
}

impl ScheduleEngine {
    pub fn new(db: Database, service: BackupService) -> Self {
        Self::with_clock(db, service, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, service: BackupService, clock: Arc<dyn Clock>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(EngineInner {
                db,
                service,
                clock,
                jobs: RwLock::new(HashMap::new()),
                shutdown_tx,
            }),
        }
    }

    /// 启动调度器：加载所有启用的任务并注册调度作业
    pub async fn start(&self) -> Result<()> {
        info!("正在启动调度引擎...");

        let tasks = self.inner.db.list_enabled_tasks().await?;
        let total = tasks.len();

        for task in tasks {
            if let Err(e) = self.add_task(&task).await {
                // 单个任务注册失败不阻止其他任务
                error!(task = %task.name, error = %e, "任务注册失败");
            }
        }

        info!("调度引擎已启动，共加载 {} 个任务", total);
        Ok(())
    }

    /// 停止调度器：不再产生新的触发；进行中的备份继续执行到结束
    pub fn stop(&self) {
        info!("正在停止调度引擎...");
        let _ = self.inner.shutdown_tx.send(true);
    }

    /// 注册任务调度作业；同ID的旧作业先被移除。
    /// 返回计算出的下次执行时间（once 任务为 None）。
    pub async fn add_task(&self, task: &Task) -> Result<Option<DateTime<Utc>>> {
        // 解析失败在这里就返回给调用方，不会注册任何作业
        let config = ScheduleConfig::parse_json(&task.schedule_config)?;
        let rule = Arc::new(ScheduleRule::parse(task.schedule_type, &config)?);

        let next_run = rule.next_after(self.inner.clock.now());

        {
            let mut jobs = self.inner.jobs.write().await;

            // 如果任务已存在，先移除旧作业
            if let Some(old) = jobs.remove(&task.id) {
                old.handle.abort();
            }

            let inner = Arc::clone(&self.inner);
            let loop_rule = Arc::clone(&rule);
            let shutdown_rx = self.inner.shutdown_tx.subscribe();
            let task_id = task.id;
            let handle = tokio::spawn(async move {
                job_loop(inner, task_id, loop_rule, shutdown_rx).await;
            });

            jobs.insert(task.id, Job { rule, handle });
        }

        // 持久化下次执行时间
        if let Err(e) = self.inner.db.update_task_next_run(task.id, next_run).await {
            warn!(task_id = task.id, error = %e, "更新下次执行时间失败");
        }

        info!(
            task = %task.name,
            task_id = task.id,
            schedule_type = %task.schedule_type,
            "任务已加入调度"
        );
        Ok(next_run)
    }

    /// 从调度器移除任务；进行中的执行不受影响
    pub async fn remove_task(&self, task_id: i64) -> Result<()> {
        let mut jobs = self.inner.jobs.write().await;

        let job = jobs
            .remove(&task_id)
            .ok_or_else(|| MbmError::not_found(format!("任务 {task_id} 不在调度器中")))?;
        job.handle.abort();

        info!(task_id, "任务已从调度器移除");
        Ok(())
    }

    /// 更新任务调度：先移除旧作业再注册。即使注册失败，
    /// 旧作业也已经不存在。
    pub async fn update_task(&self, task: &Task) -> Result<Option<DateTime<Utc>>> {
        if let Err(e) = self.remove_task(task.id).await {
            warn!(task_id = task.id, error = %e, "移除旧调度作业失败");
        }

        self.add_task(task).await
    }

    /// 立即执行任务。绕过调度规则，但仍经过任务锁；
    /// 同一任务已在执行时返回"任务正在执行中"错误，不产生日志。
    pub async fn run_task_now(&self, task_id: i64) -> Result<()> {
        let task = self
            .inner
            .db
            .get_task(task_id)
            .await?
            .ok_or_else(|| MbmError::not_found(format!("任务 {task_id} 不存在")))?;

        self.inner.service.execute_backup(&task).await
    }

    /// 查询任务的下次执行时间
    pub async fn next_run_time(&self, task_id: i64) -> Result<Option<DateTime<Utc>>> {
        let jobs = self.inner.jobs.read().await;

        let job = jobs
            .get(&task_id)
            .ok_or_else(|| MbmError::not_found(format!("任务 {task_id} 不在调度器中")))?;
        Ok(job.rule.next_after(self.inner.clock.now()))
    }
}

/// 单个任务的调度循环
async fn job_loop(
    inner: Arc<EngineInner>,
    task_id: i64,
    rule: Arc<ScheduleRule>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // once 任务注册后立即执行一次，然后结束
    if rule.is_once() {
        fire(&inner, task_id, &rule).await;
        return;
    }

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let now = inner.clock.now();
        let Some(next) = rule.next_after(now) else {
            break;
        };
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            changed = shutdown_rx.changed() => {
                match changed {
                    Ok(_) => continue,
                    // 发送端没了，引擎已被丢弃
                    Err(_) => break,
                }
            }
            _ = tokio::time::sleep(delay) => {
                // 执行派发到独立任务，移除/停止不会打断进行中的备份
                let inner = Arc::clone(&inner);
                let rule = Arc::clone(&rule);
                tokio::spawn(async move {
                    fire(&inner, task_id, &rule).await;
                });
            }
        }
    }
}

/// 一次触发：重读任务、检查启用状态、执行备份、更新下次执行时间
async fn fire(inner: &EngineInner, task_id: i64, rule: &ScheduleRule) {
    let task = match inner.db.get_task(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!(task_id, "任务已不存在，跳过本次执行");
            return;
        }
        Err(e) => {
            error!(task_id, error = %e, "加载任务失败");
            return;
        }
    };

    // 调度后被禁用的任务直接跳过，不算错误
    if !task.enabled {
        info!(task = %task.name, "任务已禁用，跳过本次执行");
    } else {
        match inner.service.execute_backup(&task).await {
            Ok(()) => {}
            Err(MbmError::TaskAlreadyRunning) => {
                warn!(task = %task.name, "任务正在执行中，跳过本次触发");
            }
            Err(e) => {
                error!(task = %task.name, error = %e, "备份执行失败");
            }
        }
    }

    // 执行后（无论成败）更新下次执行时间
    let next = rule.next_after(inner.clock.now());
    if let Err(e) = inner.db.update_task_next_run(task_id, next).await {
        warn!(task_id, error = %e, "更新下次执行时间失败");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        BackupLog, BackupType, CompressionType, Host, ScheduleType, Storage, StorageKind,
    };
    use chrono::Utc;
    use std::time::Duration as StdDuration;

    struct TestEnv {
        db: Database,
        service: BackupService,
        engine: ScheduleEngine,
        _storage_dir: tempfile::TempDir,
        _tmp_dir: tempfile::TempDir,
        host_id: i64,
        storage_id: i64,
    }

    /// 测试环境：内存库 + 本地存储 + 一台地址为空的主机。
    /// 主机地址为空会让执行在参数校验处失败，正好用来观察
    /// 引擎到服务的触发链路，而不需要真实的 mysqldump。
    async fn setup_env() -> TestEnv {
        let db = Database::connect_memory().await.unwrap();
        let storage_dir = tempfile::tempdir().unwrap();
        let tmp_dir = tempfile::tempdir().unwrap();
        let service = BackupService::new(db.clone(), tmp_dir.path());
        let engine = ScheduleEngine::new(db.clone(), service.clone());

        let host_id = db
            .create_host(Host {
                id: 0,
                name: "db-1".to_string(),
                host: String::new(),
                port: 3306,
                username: "backup".to_string(),
                password: "pw".to_string(),
                description: String::new(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let storage_id = db
            .create_storage(Storage {
                id: 0,
                name: "本地".to_string(),
                storage_type: StorageKind::Local,
                config: format!(r#"{{"base_path":"{}"}}"#, storage_dir.path().display()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        TestEnv {
            db,
            service,
            engine,
            _storage_dir: storage_dir,
            _tmp_dir: tmp_dir,
            host_id,
            storage_id,
        }
    }

    impl TestEnv {
        async fn create_task(
            &self,
            schedule_type: ScheduleType,
            schedule_config: &str,
        ) -> Task {
            let id = self
                .db
                .create_task(Task {
                    id: 0,
                    name: "nightly".to_string(),
                    host_id: self.host_id,
                    databases: String::new(),
                    backup_type: BackupType::Mysqldump,
                    schedule_type,
                    schedule_config: schedule_config.to_string(),
                    storage_id: self.storage_id,
                    retention_days: 0,
                    notification_ids: String::new(),
                    notify_on_success: false,
                    notify_on_failure: false,
                    backup_options: String::new(),
                    compression_type: CompressionType::None,
                    enabled: true,
                    last_run_at: None,
                    next_run_at: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
            self.db.get_task(id).await.unwrap().unwrap()
        }

        async fn wait_for_logs(&self, task_id: i64, count: usize) -> Vec<BackupLog> {
            for _ in 0..100 {
                let logs = self.db.list_backup_logs(Some(task_id)).await.unwrap();
                if logs.len() >= count {
                    return logs;
                }
                tokio::time::sleep(StdDuration::from_millis(50)).await;
            }
            panic!("等待备份日志超时");
        }
    }

    #[tokio::test]
    async fn test_add_task_persists_next_run() {
        let env = setup_env().await;
        let task = env
            .create_task(ScheduleType::Daily, r#"{"time":"02:00"}"#)
            .await;

        let next = env.engine.add_task(&task).await.unwrap().expect("应有下次执行时间");
        assert!(next > Utc::now());

        let stored = env.db.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run_at, Some(next));

        let queried = env.engine.next_run_time(task.id).await.unwrap();
        assert!(queried.is_some());
    }

    #[tokio::test]
    async fn test_invalid_schedule_rejected_at_registration() {
        let env = setup_env().await;
        // cron 调度缺少表达式
        let task = env.create_task(ScheduleType::Cron, "{}").await;

        assert!(matches!(
            env.engine.add_task(&task).await,
            Err(MbmError::Schedule(_))
        ));
        // 注册失败不留作业
        assert!(env.engine.next_run_time(task.id).await.is_err());
    }

    #[tokio::test]
    async fn test_update_removes_old_job_even_if_add_fails() {
        let env = setup_env().await;
        let mut task = env
            .create_task(ScheduleType::Daily, r#"{"time":"02:00"}"#)
            .await;

        env.engine.add_task(&task).await.unwrap();
        assert!(env.engine.next_run_time(task.id).await.is_ok());

        // 更新成非法配置：注册失败，但旧作业必须已经不在
        task.schedule_type = ScheduleType::Cron;
        task.schedule_config = "{}".to_string();
        assert!(env.engine.update_task(&task).await.is_err());
        assert!(env.engine.next_run_time(task.id).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_task_unregisters_job() {
        let env = setup_env().await;
        let task = env
            .create_task(ScheduleType::Daily, r#"{"time":"02:00"}"#)
            .await;

        env.engine.add_task(&task).await.unwrap();
        env.engine.remove_task(task.id).await.unwrap();

        assert!(env.engine.next_run_time(task.id).await.is_err());
        assert!(env.engine.remove_task(task.id).await.is_err());
    }

    #[tokio::test]
    async fn test_once_task_fires_immediately() {
        let env = setup_env().await;
        let task = env.create_task(ScheduleType::Once, "{}").await;

        let next = env.engine.add_task(&task).await.unwrap();
        assert!(next.is_none());

        // 主机地址为空，这次执行以校验失败收场并留下失败日志
        let logs = env.wait_for_logs(task.id, 1).await;
        assert_eq!(logs[0].status, crate::model::LogStatus::Failed);
        assert!(!logs[0].error_message.is_empty());

        // once 任务没有下一次
        assert_eq!(env.engine.next_run_time(task.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disabled_task_fire_is_noop() {
        let env = setup_env().await;
        let task = env.create_task(ScheduleType::Once, "{}").await;

        // 调度之后任务被禁用
        env.db.set_task_enabled(task.id, false).await.unwrap();
        env.engine.add_task(&task).await.unwrap();

        tokio::time::sleep(StdDuration::from_millis(400)).await;
        assert!(env.db.list_backup_logs(Some(task.id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_now_checks_lock_and_existence() {
        let env = setup_env().await;

        assert!(matches!(
            env.engine.run_task_now(12345).await,
            Err(MbmError::NotFound(_))
        ));

        let task = env
            .create_task(ScheduleType::Daily, r#"{"time":"02:00"}"#)
            .await;
        let _held = env.service.locks().try_acquire(task.id).unwrap();

        assert!(matches!(
            env.engine.run_task_now(task.id).await,
            Err(MbmError::TaskAlreadyRunning)
        ));
        // 并发拒绝不产生日志
        assert!(env.db.list_backup_logs(Some(task.id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_halts_future_fires() {
        let env = setup_env().await;
        // 每秒触发一次
        let task = env
            .create_task(ScheduleType::Cron, r#"{"expression":"* * * * * *"}"#)
            .await;

        env.engine.add_task(&task).await.unwrap();
        env.wait_for_logs(task.id, 1).await;

        env.engine.stop();
        tokio::time::sleep(StdDuration::from_millis(200)).await;
        let count_at_stop = env.db.list_backup_logs(Some(task.id)).await.unwrap().len();

        tokio::time::sleep(StdDuration::from_millis(2500)).await;
        let count_after = env.db.list_backup_logs(Some(task.id)).await.unwrap().len();

        // 停止后不再产生新触发（最多允许一个已派发的在途执行落盘）
        assert!(count_after <= count_at_stop + 1);
    }
}
