// 备份执行器
//
// 三种引擎共享同一契约，执行策略不同：
// - mysqldump: 单进程直连导出，stdout 落盘后按需压缩
// - mydumper: 多线程并行导出到目录，归档为单一产物
// - xtrabackup: 经 SSH 在数据库主机上执行物理备份并取回

mod archive;
mod mydumper;
mod mysqldump;
mod xtrabackup;

pub use archive::{gzip_file, tar_dir, tar_gz_dir, zip_dir, zip_file};
pub use mydumper::MydumperExecutor;
pub use mysqldump::MysqldumpExecutor;
pub use xtrabackup::XtrabackupExecutor;

use crate::model::{BackupType, CompressionType};
use crate::{MbmError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// 备份参数
#[derive(Debug, Clone)]
pub struct BackupParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// 空表示全部数据库
    pub databases: Vec<String>,
    /// 本次执行的独占工作目录
    pub output_dir: PathBuf,
    /// 引擎相关的额外选项原文
    pub options: String,
    pub compression: CompressionType,
}

/// 备份结果
#[derive(Debug, Clone)]
pub struct BackupResult {
    pub file_path: PathBuf,
    pub file_size: u64,
    pub duration: Duration,
    pub databases: Vec<String>,
    /// 脱敏后的完整备份命令，可直接写入审计日志
    pub command: String,
}

/// 备份执行器接口
#[async_trait]
pub trait Executor: Send + Sync {
    /// 执行器类型
    fn kind(&self) -> BackupType;

    /// 校验参数；所有校验错误在任何外部调用之前出现
    fn validate(&self, params: &BackupParams) -> Result<()>;

    /// 执行备份，返回单一本地产物
    async fn execute(&self, params: &BackupParams) -> Result<BackupResult>;
}

/// 根据备份类型选择执行器
pub fn executor_for(backup_type: BackupType) -> Arc<dyn Executor> {
    match backup_type {
        BackupType::Mysqldump => Arc::new(MysqldumpExecutor),
        BackupType::Mydumper => Arc::new(MydumperExecutor),
        BackupType::Xtrabackup => Arc::new(XtrabackupExecutor),
    }
}

/// 公共参数校验
pub(crate) fn validate_connection(params: &BackupParams) -> Result<()> {
    if params.host.trim().is_empty() {
        return Err(MbmError::validation("数据库主机地址不能为空"));
    }
    if params.username.trim().is_empty() {
        return Err(MbmError::validation("数据库用户名不能为空"));
    }
    if params.output_dir.as_os_str().is_empty() {
        return Err(MbmError::validation("输出目录不能为空"));
    }
    Ok(())
}

/// 产物文件名的时间戳部分
pub(crate) fn artifact_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// 构造审计用命令串：凡包含密码字面值的参数一律替换为 ***
pub(crate) fn redact_command(program: &str, args: &[String], password: &str) -> String {
    let mut command = String::from(program);
    for arg in args {
        command.push(' ');
        if !password.is_empty() && arg.contains(password) {
            command.push_str(&arg.replace(password, "***"));
        } else {
            command.push_str(arg);
        }
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_password_value_styles() {
        let password = "s3cret";
        let args = vec![
            "--host=db-1".to_string(),
            format!("--password={password}"),
            "-p".to_string(),
            password.to_string(),
        ];

        let command = redact_command("mysqldump", &args, password);
        assert!(!command.contains(password));
        assert!(command.contains("--password=***"));
        assert!(command.ends_with("-p ***"));
    }

    #[test]
    fn test_redact_empty_password_untouched() {
        let args = vec!["--all-databases".to_string()];
        let command = redact_command("mysqldump", &args, "");
        assert_eq!(command, "mysqldump --all-databases");
    }

    #[test]
    fn test_validate_connection() {
        let mut params = BackupParams {
            host: "db-1".to_string(),
            port: 3306,
            username: "backup".to_string(),
            password: "pw".to_string(),
            databases: vec![],
            output_dir: PathBuf::from("/tmp/work"),
            options: String::new(),
            compression: CompressionType::Gzip,
        };
        assert!(validate_connection(&params).is_ok());

        params.host = String::new();
        assert!(validate_connection(&params).is_err());

        params.host = "db-1".to_string();
        params.username = "  ".to_string();
        assert!(validate_connection(&params).is_err());
    }

    #[test]
    fn test_executor_factory_kinds() {
        for kind in [
            BackupType::Mysqldump,
            BackupType::Mydumper,
            BackupType::Xtrabackup,
        ] {
            assert_eq!(executor_for(kind).kind(), kind);
        }
    }
}
