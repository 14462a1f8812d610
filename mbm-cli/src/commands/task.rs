use crate::app::CliApp;
use crate::cli::TaskCommand;
use mbm_core::Result;
use tracing::info;

/// 处理任务命令
pub async fn handle_task_command(app: &CliApp, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::List => run_task_list(app).await,
        TaskCommand::Run { id } => run_task_now(app, id).await,
        TaskCommand::Enable { id } => set_task_enabled(app, id, true).await,
        TaskCommand::Disable { id } => set_task_enabled(app, id, false).await,
    }
}

async fn run_task_list(app: &CliApp) -> Result<()> {
    let tasks = app.database.list_tasks().await?;
    if tasks.is_empty() {
        info!("暂无备份任务");
        return Ok(());
    }

    for task in tasks {
        let next_run = task
            .next_run_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "[{}] {} 引擎={} 调度={} 启用={} 下次执行={}",
            task.id, task.name, task.backup_type, task.schedule_type, task.enabled, next_run
        );
    }
    Ok(())
}

async fn run_task_now(app: &CliApp, id: i64) -> Result<()> {
    info!(task_id = id, "立即执行备份任务");
    app.engine.run_task_now(id).await?;
    info!(task_id = id, "备份任务执行完成");
    Ok(())
}

async fn set_task_enabled(app: &CliApp, id: i64, enabled: bool) -> Result<()> {
    app.database.set_task_enabled(id, enabled).await?;
    if enabled {
        info!(task_id = id, "任务已启用");
    } else {
        info!(task_id = id, "任务已禁用，不再产生新的调度触发");
    }
    Ok(())
}
