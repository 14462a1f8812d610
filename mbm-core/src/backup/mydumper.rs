use super::{
    BackupParams, BackupResult, Executor, archive, artifact_timestamp, redact_command,
    validate_connection,
};
use crate::model::{BackupType, CompressionType};
use crate::{MbmError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// mydumper 备份执行器：多线程并行导出到目录，再归档成单一产物
pub struct MydumperExecutor;

#[async_trait]
impl Executor for MydumperExecutor {
    fn kind(&self) -> BackupType {
        BackupType::Mydumper
    }

    fn validate(&self, params: &BackupParams) -> Result<()> {
        validate_connection(params)
    }

    async fn execute(&self, params: &BackupParams) -> Result<BackupResult> {
        let started = Instant::now();
        self.validate(params)?;

        let binary = which::which("mydumper")
            .map_err(|_| MbmError::execution("未找到 mydumper，请确认其在 PATH 中"))?;

        let timestamp = artifact_timestamp();
        let dump_dir = params.output_dir.join(format!("backup_{timestamp}"));
        tokio::fs::create_dir_all(&dump_dir).await?;

        let args = build_args(params, &dump_dir);
        let command = redact_command("mydumper", &args, &params.password);

        let output = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let _ = tokio::fs::remove_dir_all(&dump_dir).await;
            return Err(MbmError::execution(format!(
                "mydumper 退出异常 ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        // 整个目录归档为单一产物：none -> tar，zip -> zip，gzip -> tar.gz
        let final_file = match params.compression {
            CompressionType::None => {
                let dst = params.output_dir.join(format!("backup_{timestamp}.tar"));
                (archive::tar_dir(&dump_dir, &dst).await, dst)
            }
            CompressionType::Zip => {
                let dst = params.output_dir.join(format!("backup_{timestamp}.zip"));
                (archive::zip_dir(&dump_dir, &dst).await, dst)
            }
            CompressionType::Gzip => {
                let dst = params
                    .output_dir
                    .join(format!("backup_{timestamp}.tar.gz"));
                (archive::tar_gz_dir(&dump_dir, &dst).await, dst)
            }
        };

        // 无论归档成败，中间目录一律删除
        let _ = tokio::fs::remove_dir_all(&dump_dir).await;

        let (archive_result, final_file) = final_file;
        if let Err(e) = archive_result {
            let _ = tokio::fs::remove_file(&final_file).await;
            return Err(e);
        }

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

fn build_args(params: &BackupParams, dump_dir: &PathBuf) -> Vec<String> {
    let mut args = vec![
        "-h".to_string(),
        params.host.clone(),
        "-P".to_string(),
        params.port.to_string(),
        "-u".to_string(),
        params.username.clone(),
        "-p".to_string(),
        params.password.clone(),
        "-o".to_string(),
        dump_dir.to_string_lossy().to_string(),
        "--threads".to_string(),
        num_cpus::get().to_string(),
    ];

    for db in &params.databases {
        args.push("-B".to_string());
        args.push(db.clone());
    }

    // 额外命令行参数
    for extra in params.options.split_whitespace() {
        args.push(extra.to_string());
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CompressionType;

    fn params() -> BackupParams {
        BackupParams {
            host: "db-1".to_string(),
            port: 3307,
            username: "backup".to_string(),
            password: "topsecret".to_string(),
            databases: vec!["app".to_string(), "auth".to_string()],
            output_dir: PathBuf::from("/tmp/work"),
            options: "--threads 8".to_string(),
            compression: CompressionType::None,
        }
    }

    #[test]
    fn test_args_databases_and_threads() {
        let p = params();
        let dump_dir = PathBuf::from("/tmp/work/backup_x");
        let args = build_args(&p, &dump_dir);

        // 每个数据库一个 -B
        assert_eq!(args.iter().filter(|a| *a == "-B").count(), 2);
        assert!(args.contains(&"app".to_string()));
        // 额外选项追加在默认线程数之后，可覆盖默认值
        let last_threads = args.iter().rposition(|a| a == "--threads").unwrap();
        assert_eq!(args[last_threads + 1], "8");
    }

    #[test]
    fn test_command_never_leaks_password() {
        let p = params();
        let dump_dir = PathBuf::from("/tmp/work/backup_x");
        let args = build_args(&p, &dump_dir);
        let command = redact_command("mydumper", &args, &p.password);
        assert!(!command.contains("topsecret"));
        assert!(command.contains("***"));
    }
}
