use super::{FileInfo, S3Config, StorageBackend};
use crate::{MbmError, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, DateTime as SmithyDateTime};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// S3对象存储（兼容 MinIO 等自定义 endpoint）
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "mbm-static",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        // 自定义 endpoint（MinIO 等）需要 path-style 访问
        if !config.endpoint.trim().is_empty() {
            builder = builder
                .endpoint_url(config.endpoint.clone())
                .force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
        }
    }
}

fn to_chrono(dt: &SmithyDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()).unwrap_or_else(Utc::now)
}

#[async_trait]
impl StorageBackend for S3Storage {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| MbmError::storage(format!("读取本地文件失败: {e}")))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(remote_path)
            .body(body)
            .send()
            .await
            .map_err(|e| MbmError::storage(format!("上传文件失败: {}", DisplayErrorContext(e))))?;
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(remote_path)
            .send()
            .await
            .map_err(|e| MbmError::storage(format!("下载文件失败: {}", DisplayErrorContext(e))))?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(local_path).await?;
        let mut body = response.body;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| MbmError::storage(format!("读取对象内容失败: {e}")))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(remote_path)
            .send()
            .await
            .map_err(|e| MbmError::storage(format!("删除文件失败: {}", DisplayErrorContext(e))))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<FileInfo>> {
        let mut files = Vec::new();
        let mut continuation: Option<String> = None;

        // 跟随 continuation token 翻页直到取完
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| {
                MbmError::storage(format!("列出文件失败: {}", DisplayErrorContext(e)))
            })?;

            for object in response.contents() {
                let key = object.key().unwrap_or_default().to_string();
                files.push(FileInfo {
                    name: key.clone(),
                    path: key,
                    size: object.size().unwrap_or(0),
                    modified: object.last_modified().map(to_chrono).unwrap_or_else(Utc::now),
                });
            }

            if response.is_truncated().unwrap_or(false) {
                continuation = response.next_continuation_token().map(str::to_string);
                if continuation.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(files)
    }

    async fn exists(&self, remote_path: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(remote_path)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(MbmError::storage(format!("检查文件失败: {service_error}")))
                }
            }
        }
    }

    async fn file_info(&self, remote_path: &str) -> Result<FileInfo> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(remote_path)
            .send()
            .await
            .map_err(|e| {
                MbmError::storage(format!("获取文件信息失败: {}", DisplayErrorContext(e)))
            })?;

        Ok(FileInfo {
            name: remote_path.to_string(),
            path: remote_path.to_string(),
            size: response.content_length().unwrap_or(0),
            modified: response
                .last_modified()
                .map(to_chrono)
                .unwrap_or_else(Utc::now),
        })
    }

    async fn test_connection(&self) -> Result<()> {
        self.client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| MbmError::storage(format!("连接S3失败: {}", DisplayErrorContext(e))))?;
        Ok(())
    }
}
