use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mbm-cli", version, about = "MySQL 数据库备份调度与管理工具")]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 启动调度服务
    Serve,

    /// 备份任务管理
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// 存储目标管理
    Storage {
        #[command(subcommand)]
        command: StorageCommand,
    },

    /// 查看备份日志
    Logs {
        /// 只看指定任务的日志
        #[arg(long)]
        task_id: Option<i64>,
    },
}

/// 备份任务相关命令
#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// 列出所有任务
    List,
    /// 立即执行一次任务
    Run {
        /// 任务ID
        id: i64,
    },
    /// 启用任务
    Enable {
        /// 任务ID
        id: i64,
    },
    /// 禁用任务
    Disable {
        /// 任务ID
        id: i64,
    },
}

/// 存储目标相关命令
#[derive(Subcommand, Debug)]
pub enum StorageCommand {
    /// 测试存储连接
    Test {
        /// 存储ID
        id: i64,
    },
    /// 查看存储磁盘空间
    Usage {
        /// 存储ID
        id: i64,
    },
}
