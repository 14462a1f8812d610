use super::{
    BackupParams, BackupResult, Executor, archive, artifact_timestamp, redact_command,
    validate_connection,
};
use crate::model::{BackupType, CompressionType};
use crate::{MbmError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// mysqldump 备份执行器：单进程直连导出
pub struct MysqldumpExecutor;

#[async_trait]
impl Executor for MysqldumpExecutor {
    fn kind(&self) -> BackupType {
        BackupType::Mysqldump
    }

    fn validate(&self, params: &BackupParams) -> Result<()> {
        validate_connection(params)
    }

    async fn execute(&self, params: &BackupParams) -> Result<BackupResult> {
        let started = Instant::now();
        self.validate(params)?;

        tokio::fs::create_dir_all(&params.output_dir).await?;

        let binary = which::which("mysqldump")
            .map_err(|_| MbmError::execution("未找到 mysqldump，请确认其在 PATH 中"))?;

        let args = build_args(params);
        let command = redact_command("mysqldump", &args, &params.password);

        let timestamp = artifact_timestamp();
        let sql_file = params.output_dir.join(format!("backup_{timestamp}.sql"));

        // stdout 直接流式写入文件，stderr 捕获用于诊断
        let out_file = std::fs::File::create(&sql_file)?;
        let output = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::from(out_file))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // 丢弃不完整的产物
            let _ = tokio::fs::remove_file(&sql_file).await;
            return Err(MbmError::execution(format!(
                "mysqldump 退出异常 ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        // 按压缩类型处理产物
        let final_file = match params.compression {
            CompressionType::None => sql_file.clone(),
            CompressionType::Gzip => {
                let dst = params
                    .output_dir
                    .join(format!("backup_{timestamp}.sql.gz"));
                if let Err(e) = archive::gzip_file(&sql_file, &dst).await {
                    let _ = tokio::fs::remove_file(&sql_file).await;
                    let _ = tokio::fs::remove_file(&dst).await;
                    return Err(e);
                }
                tokio::fs::remove_file(&sql_file).await?;
                dst
            }
            CompressionType::Zip => {
                let dst = params
                    .output_dir
                    .join(format!("backup_{timestamp}.sql.zip"));
                if let Err(e) = archive::zip_file(&sql_file, &dst).await {
                    let _ = tokio::fs::remove_file(&sql_file).await;
                    let _ = tokio::fs::remove_file(&dst).await;
                    return Err(e);
                }
                tokio::fs::remove_file(&sql_file).await?;
                dst
            }
        };

        let metadata = tokio::fs::metadata(&final_file).await?;

        Ok(BackupResult {
            file_path: final_file,
            file_size: metadata.len(),
            duration: started.elapsed(),
            databases: params.databases.clone(),
            command,
        })
    }
}

fn build_args(params: &BackupParams) -> Vec<String> {
    let mut args = vec![
        format!("--host={}", params.host),
        format!("--port={}", params.port),
        format!("--user={}", params.username),
        format!("--password={}", params.password),
        "--single-transaction".to_string(),
        "--quick".to_string(),
        "--lock-tables=false".to_string(),
        "--routines".to_string(),
        "--triggers".to_string(),
        "--events".to_string(),
    ];

    // 额外命令行参数
    for extra in params.options.split_whitespace() {
        args.push(extra.to_string());
    }

    if params.databases.is_empty() {
        args.push("--all-databases".to_string());
    } else {
        args.push("--databases".to_string());
        args.extend(params.databases.iter().cloned());
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn params(databases: Vec<String>) -> BackupParams {
        BackupParams {
            host: "db-1".to_string(),
            port: 3306,
            username: "backup".to_string(),
            password: "topsecret".to_string(),
            databases,
            output_dir: PathBuf::from("/tmp/work"),
            options: "--set-gtid-purged=OFF".to_string(),
            compression: CompressionType::Gzip,
        }
    }

    #[test]
    fn test_args_all_databases_and_extras() {
        let args = build_args(&params(vec![]));
        assert!(args.contains(&"--all-databases".to_string()));
        assert!(args.contains(&"--set-gtid-purged=OFF".to_string()));
        assert!(args.contains(&"--single-transaction".to_string()));
    }

    #[test]
    fn test_args_explicit_databases() {
        let args = build_args(&params(vec!["app".to_string(), "auth".to_string()]));
        let pos = args.iter().position(|a| a == "--databases").unwrap();
        assert_eq!(&args[pos + 1..pos + 3], ["app", "auth"]);
        assert!(!args.contains(&"--all-databases".to_string()));
    }

    #[test]
    fn test_command_never_leaks_password() {
        let p = params(vec![]);
        let args = build_args(&p);
        let command = redact_command("mysqldump", &args, &p.password);
        assert!(!command.contains("topsecret"));
        assert!(command.contains("--password=***"));
    }
}
