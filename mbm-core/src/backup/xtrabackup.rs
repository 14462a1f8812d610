use super::{BackupParams, BackupResult, Executor, artifact_timestamp, validate_connection};
use crate::model::{BackupType, CompressionType};
use crate::ssh::{SshAuth, SshClient};
use crate::{MbmError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::warn;

/// xtrabackup 备份执行器：经SSH在数据库主机上做物理备份并取回单一产物
pub struct XtrabackupExecutor;

/// xtrabackup 的 backup_options JSON 结构
#[derive(Debug, Clone, Deserialize)]
pub struct XtrabackupOptions {
    pub ssh_config: SshAuth,
    /// xtrabackup 可执行文件路径，缺省使用远端 PATH 中的 xtrabackup
    #[serde(default)]
    pub xtrabackup_path: String,
    /// 追加的命令行参数
    #[serde(default)]
    pub extra_args: String,
}

impl XtrabackupOptions {
    fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(MbmError::validation("xtrabackup 需要在 backup_options 中提供 SSH 配置"));
        }
        let options: XtrabackupOptions = serde_json::from_str(raw)
            .map_err(|e| MbmError::validation(format!("xtrabackup 选项解析失败: {e}")))?;
        options.ssh_config.validate()?;
        Ok(options)
    }
}

#[async_trait]
impl Executor for XtrabackupExecutor {
    fn kind(&self) -> BackupType {
        BackupType::Xtrabackup
    }

    fn validate(&self, params: &BackupParams) -> Result<()> {
        validate_connection(params)?;
        XtrabackupOptions::parse(&params.options)?;
        Ok(())
    }

    async fn execute(&self, params: &BackupParams) -> Result<BackupResult> {
        let started = Instant::now();
        self.validate(params)?;
        let options = XtrabackupOptions::parse(&params.options)?;

        tokio::fs::create_dir_all(&params.output_dir).await?;

        let timestamp = artifact_timestamp();
        let remote_dir = format!("/tmp/xtrabackup_{timestamp}");

        let xtrabackup_path = if options.xtrabackup_path.is_empty() {
            "xtrabackup".to_string()
        } else {
            options.xtrabackup_path.clone()
        };

        let mut backup_cmd = format!(
            "{} --backup --host={} --port={} --user={} --password='{}' --target-dir={}",
            xtrabackup_path, params.host, params.port, params.username, params.password, remote_dir
        );
        if !options.extra_args.trim().is_empty() {
            backup_cmd.push(' ');
            backup_cmd.push_str(options.extra_args.trim());
        }

        // 审计命令串：绝不能出现密码字面值
        let command = if params.password.is_empty() {
            backup_cmd.clone()
        } else {
            backup_cmd.replace(&params.password, "***")
        };

        // 按压缩类型在远端打包成单一文件
        let (remote_file, archive_cmd) = match params.compression {
            CompressionType::None => {
                let file = format!("{remote_dir}.tar");
                (file.clone(), format!("tar -cf {file} -C {remote_dir} ."))
            }
            CompressionType::Zip => {
                let file = format!("{remote_dir}.zip");
                (file.clone(), format!("cd {remote_dir} && zip -r {file} ."))
            }
            CompressionType::Gzip => {
                let file = format!("{remote_dir}.tar.gz");
                (file.clone(), format!("tar -czf {file} -C {remote_dir} ."))
            }
        };

        let file_name = PathBuf::from(&remote_file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| MbmError::custom("无法取得远端产物文件名"))?;
        let local_file = params.output_dir.join(file_name);

        // 整段SSH会话是阻塞操作
        let auth = options.ssh_config.clone();
        let download_target = local_file.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let client = SshClient::connect(&auth)?;

            let run = || -> Result<()> {
                client.exec(&format!("mkdir -p {remote_dir}"))?;
                client.exec(&backup_cmd)?;
                client.exec(&archive_cmd)?;
                client.download(&remote_file, &download_target)?;
                Ok(())
            };
            let result = run();

            // 无论成败都尽力清理远端临时状态；清理失败不覆盖原始错误
            if let Err(e) = client.exec(&format!("rm -rf {remote_dir} {remote_file}")) {
                warn!(error = %e, "清理远端临时文件失败");
            }

            result
        })
        .await?
        .inspect_err(|_| {
            // 失败时丢弃可能残留的本地半成品
            let _ = std::fs::remove_file(&local_file);
        })?;

        let metadata = tokio::fs::metadata(&local_file).await?;

        Ok(BackupResult {
            file_path: local_file,
            file_size: metadata.len(),
            duration: started.elapsed(),
            databases: params.databases.clone(),
            command,
        })
    }
}
