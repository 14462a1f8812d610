use crate::app::CliApp;
use mbm_core::{MbmError, Result};
use tracing::info;

/// 启动调度服务并等待退出信号
pub async fn run_serve(app: &CliApp) -> Result<()> {
    app.engine.start().await?;
    info!("调度服务已启动，按 Ctrl-C 退出");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| MbmError::custom(format!("等待退出信号失败: {e}")))?;

    info!("收到退出信号，正在停止调度...");
    app.engine.stop();
    Ok(())
}
