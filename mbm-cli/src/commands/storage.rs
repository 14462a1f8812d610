use crate::app::CliApp;
use crate::cli::StorageCommand;
use mbm_core::storage::create_backend;
use mbm_core::{MbmError, Result};
use tracing::info;

/// 处理存储命令
pub async fn handle_storage_command(app: &CliApp, command: StorageCommand) -> Result<()> {
    match command {
        StorageCommand::Test { id } => run_storage_test(app, id).await,
        StorageCommand::Usage { id } => run_storage_usage(app, id).await,
    }
}

async fn load_backend(
    app: &CliApp,
    id: i64,
) -> Result<(String, std::sync::Arc<dyn mbm_core::storage::StorageBackend>)> {
    let storage = app
        .database
        .get_storage(id)
        .await?
        .ok_or_else(|| MbmError::not_found(format!("存储 {id} 不存在")))?;
    let backend = create_backend(&storage)?;
    Ok((storage.name, backend))
}

async fn run_storage_test(app: &CliApp, id: i64) -> Result<()> {
    let (name, backend) = load_backend(app, id).await?;
    backend.test_connection().await?;
    info!(storage = %name, "存储连接正常");
    Ok(())
}

async fn run_storage_usage(app: &CliApp, id: i64) -> Result<()> {
    let (name, backend) = load_backend(app, id).await?;
    let usage = backend.disk_usage().await?;

    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    info!(
        "存储 {} 磁盘空间：总量 {:.2} GiB，已用 {:.2} GiB，可用 {:.2} GiB",
        name,
        usage.total as f64 / GIB,
        usage.used as f64 / GIB,
        usage.free as f64 / GIB
    );
    Ok(())
}
