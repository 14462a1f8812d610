use crate::app::CliApp;
use mbm_core::Result;
use tracing::info;

/// 查看备份日志
pub async fn run_list_logs(app: &CliApp, task_id: Option<i64>) -> Result<()> {
    let logs = app.database.list_backup_logs(task_id).await?;
    if logs.is_empty() {
        info!("暂无备份日志");
        return Ok(());
    }

    for log in logs {
        let end_time = log
            .end_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "[{}] 任务={} 状态={} 开始={} 结束={} 耗时={}s 大小={}B 产物={} {}",
            log.id,
            log.task_name,
            log.status,
            log.start_time.format("%Y-%m-%d %H:%M:%S"),
            end_time,
            log.duration,
            log.file_size,
            if log.file_path.is_empty() { "-" } else { log.file_path.as_str() },
            log.error_message
        );
    }
    Ok(())
}
