// SSH远程存储
//
// 所有操作都通过一条认证过的SSH会话执行 shell 命令实现；
// 会话按操作建立，阻塞部分统一放进 spawn_blocking。

use super::{DiskUsage, FileInfo, SshStorageConfig, StorageBackend};
use crate::ssh::SshClient;
use crate::{MbmError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub struct SshStorage {
    config: SshStorageConfig,
}

impl SshStorage {
    pub fn new(config: SshStorageConfig) -> Self {
        Self { config }
    }

    fn base_path(&self) -> String {
        self.config.base_path.trim_end_matches('/').to_string()
    }

    fn full_path(&self, remote_path: &str) -> String {
        format!("{}/{}", self.base_path(), remote_path.trim_start_matches('/'))
    }

    /// 在新会话上执行一段阻塞SSH操作
    async fn with_client<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SshClient) -> Result<T> + Send + 'static,
    {
        let auth = self.config.auth.clone();
        tokio::task::spawn_blocking(move || {
            let client = SshClient::connect(&auth)?;
            operation(&client)
        })
        .await?
    }
}

#[async_trait]
impl StorageBackend for SshStorage {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let full = self.full_path(remote_path);
        let remote_dir = parent_dir(&full);
        let local = local_path.to_path_buf();

        self.with_client(move |client| {
            // 上传前先创建远端目录
            client.exec(&format!("mkdir -p {remote_dir}"))?;
            client.upload(&local, &full)?;
            Ok(())
        })
        .await
        .map_err(|e| MbmError::storage(format!("上传文件失败: {e}")))
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let full = self.full_path(remote_path);
        let local: PathBuf = local_path.to_path_buf();

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.with_client(move |client| client.download(&full, &local))
            .await
            .map_err(|e| MbmError::storage(format!("下载文件失败: {e}")))
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        let full = self.full_path(remote_path);

        self.with_client(move |client| {
            client.exec(&format!("rm -f {full}"))?;
            Ok(())
        })
        .await
        .map_err(|e| MbmError::storage(format!("删除文件失败: {e}")))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<FileInfo>> {
        let base = self.base_path();
        let search = self.full_path(prefix);

        let output = self
            .with_client(move |client| {
                client.exec(&format!(
                    "find {search} -type f -printf '%p\\t%s\\t%T@\\n' 2>/dev/null || true"
                ))
            })
            .await
            .map_err(|e| MbmError::storage(format!("列出文件失败: {e}")))?;

        Ok(parse_find_output(&output, &base))
    }

    async fn exists(&self, remote_path: &str) -> Result<bool> {
        let full = self.full_path(remote_path);

        let (status, _) = self
            .with_client(move |client| client.exec_with_status(&format!("test -f {full}")))
            .await
            .map_err(|e| MbmError::storage(format!("检查文件失败: {e}")))?;
        Ok(status == 0)
    }

    async fn file_info(&self, remote_path: &str) -> Result<FileInfo> {
        let full = self.full_path(remote_path);

        let output = self
            .with_client(move |client| client.exec(&format!("stat -c '%s %Y' {full}")))
            .await
            .map_err(|e| MbmError::storage(format!("获取文件信息失败: {e}")))?;

        let (size, modified) = parse_stat_output(&output)
            .ok_or_else(|| MbmError::storage(format!("stat 输出无法解析: {}", output.trim())))?;

        Ok(FileInfo {
            name: file_name(remote_path),
            path: remote_path.to_string(),
            size,
            modified,
        })
    }

    async fn test_connection(&self) -> Result<()> {
        let probe = format!("{}/.mbm_probe", self.base_path());

        self.with_client(move |client| {
            client.exec(&format!("mkdir -p {probe} && rmdir {probe}"))?;
            Ok(())
        })
        .await
        .map_err(|e| MbmError::storage(format!("连接SSH存储失败: {e}")))
    }

    async fn disk_usage(&self) -> Result<DiskUsage> {
        let base = self.base_path();

        let output = self
            .with_client(move |client| {
                client.exec(&format!("df -B1 {base} | tail -1 | awk '{{print $2,$3,$4}}'"))
            })
            .await
            .map_err(|e| MbmError::storage(format!("获取磁盘空间失败: {e}")))?;

        parse_df_output(&output)
            .ok_or_else(|| MbmError::storage(format!("df 输出无法解析: {}", output.trim())))
    }
}

fn parent_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir.to_string(),
        _ => "/".to_string(),
    }
}

fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// 解析 find -printf '%p\t%s\t%T@\n' 的输出
fn parse_find_output(output: &str, base_path: &str) -> Vec<FileInfo> {
    let mut files = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split('\t');
        let (Some(full_path), Some(size), Some(mtime)) =
            (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };

        let Ok(size) = size.parse::<i64>() else {
            continue;
        };
        // %T@ 是带小数的 Unix 时间戳
        let Ok(mtime) = mtime.parse::<f64>() else {
            continue;
        };

        let relative = full_path
            .strip_prefix(base_path)
            .unwrap_or(full_path)
            .trim_start_matches('/')
            .to_string();

        files.push(FileInfo {
            name: file_name(full_path),
            path: relative,
            size,
            modified: DateTime::from_timestamp(mtime as i64, 0).unwrap_or_else(Utc::now),
        });
    }

    files
}

/// 解析 stat -c '%s %Y' 的输出
fn parse_stat_output(output: &str) -> Option<(i64, DateTime<Utc>)> {
    let mut parts = output.split_whitespace();
    let size = parts.next()?.parse::<i64>().ok()?;
    let mtime = parts.next()?.parse::<i64>().ok()?;
    Some((size, DateTime::from_timestamp(mtime, 0)?))
}

/// 解析 df -B1 的 "总量 已用 可用" 输出
fn parse_df_output(output: &str) -> Option<DiskUsage> {
    let mut parts = output.split_whitespace();
    let total = parts.next()?.parse::<u64>().ok()?;
    let used = parts.next()?.parse::<u64>().ok()?;
    let free = parts.next()?.parse::<u64>().ok()?;
    Some(DiskUsage { total, used, free })
}
