use mbm_core::config::AppConfig;
use mbm_core::db::Database;
use mbm_core::schedule::ScheduleEngine;
use mbm_core::service::BackupService;
use mbm_core::Result;
use std::path::Path;

use crate::cli::Commands;
use crate::commands;

#[derive(Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub database: Database,
    pub service: BackupService,
    pub engine: ScheduleEngine,
}

impl CliApp {
    /// 加载配置并初始化应用
    pub async fn new(config_path: &Path) -> Result<Self> {
        let config = if config_path.exists() {
            AppConfig::load_from_file(config_path)?
        } else {
            AppConfig::find_and_load_config()?
        };
        config.ensure_dirs()?;

        let database = Database::connect(&config.database.path).await?;
        let service = BackupService::new(database.clone(), &config.backup.tmp_dir);
        let engine = ScheduleEngine::new(database.clone(), service.clone());

        Ok(Self {
            config,
            database,
            service,
            engine,
        })
    }

    /// 运行应用命令
    pub async fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Serve => commands::run_serve(self).await,
            Commands::Task { command } => commands::handle_task_command(self, command).await,
            Commands::Storage { command } => commands::handle_storage_command(self, command).await,
            Commands::Logs { task_id } => commands::run_list_logs(self, task_id).await,
        }
    }
}
