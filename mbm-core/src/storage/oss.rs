// 阿里云OSS存储
//
// 走 OSS REST API（虚拟主机寻址 + Header 签名），依赖 reqwest。
// 签名规则: Authorization: OSS <AccessKeyId>:<base64(hmac-sha1(secret, string_to_sign))>
// string_to_sign = VERB\nContent-MD5\nContent-Type\nDate\nCanonicalizedResource

use super::{FileInfo, OssConfig, StorageBackend};
use crate::{MbmError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use sha1::Sha1;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

type HmacSha1 = Hmac<Sha1>;

const OCTET_STREAM: &str = "application/octet-stream";

pub struct OssStorage {
    client: reqwest::Client,
    /// 不带协议前缀的 endpoint，例如 oss-cn-hangzhou.aliyuncs.com
    endpoint: String,
    bucket: String,
    access_key_id: String,
    access_key_secret: String,
}

impl OssStorage {
    pub fn new(config: OssConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            endpoint: normalize_endpoint(&config.endpoint),
            bucket: config.bucket,
            access_key_id: config.access_key_id,
            access_key_secret: config.access_key_secret,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://{}.{}/{}", self.bucket, self.endpoint, key)
    }

    fn bucket_url(&self) -> String {
        format!("https://{}.{}/", self.bucket, self.endpoint)
    }

    fn date_header() -> String {
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    fn authorization(
        &self,
        verb: &str,
        content_type: &str,
        date: &str,
        resource: &str,
    ) -> Result<String> {
        let signature = hmac_sha1_base64(
            &self.access_key_secret,
            &string_to_sign(verb, content_type, date, resource),
        )?;
        Ok(format!("OSS {}:{}", self.access_key_id, signature))
    }

    fn object_resource(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, key)
    }

    async fn list_page(&self, prefix: &str, marker: &str) -> Result<ListPage> {
        let date = Self::date_header();
        let resource = format!("/{}/", self.bucket);
        let authorization = self.authorization("GET", "", &date, &resource)?;

        let mut query = vec![
            ("prefix", prefix.to_string()),
            ("max-keys", "1000".to_string()),
        ];
        if !marker.is_empty() {
            query.push(("marker", marker.to_string()));
        }

        let response = self
            .client
            .get(self.bucket_url())
            .query(&query)
            .header("Date", &date)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;
        let response = ensure_success(response, "列出文件失败").await?;

        parse_list_response(&response.text().await?)
    }
}

#[async_trait]
impl StorageBackend for OssStorage {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let date = Self::date_header();
        let authorization = self.authorization(
            "PUT",
            OCTET_STREAM,
            &date,
            &self.object_resource(remote_path),
        )?;

        let file = tokio::fs::File::open(local_path).await?;
        let size = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .client
            .put(self.object_url(remote_path))
            .header("Date", &date)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .header(CONTENT_LENGTH, size)
            .header(AUTHORIZATION, authorization)
            .body(body)
            .send()
            .await?;
        ensure_success(response, "上传文件失败").await?;
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let date = Self::date_header();
        let authorization =
            self.authorization("GET", "", &date, &self.object_resource(remote_path))?;

        let response = self
            .client
            .get(self.object_url(remote_path))
            .header("Date", &date)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;
        let mut response = ensure_success(response, "下载文件失败").await?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(local_path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        let date = Self::date_header();
        let authorization =
            self.authorization("DELETE", "", &date, &self.object_resource(remote_path))?;

        let response = self
            .client
            .delete(self.object_url(remote_path))
            .header("Date", &date)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;
        ensure_success(response, "删除文件失败").await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<FileInfo>> {
        let mut files = Vec::new();
        let mut marker = String::new();

        // 跟随 marker 翻页直到取完
        loop {
            let page = self.list_page(prefix, &marker).await?;
            files.extend(page.files);

            if !page.is_truncated {
                break;
            }
            match page.next_marker {
                Some(next) if !next.is_empty() => marker = next,
                _ => break,
            }
        }

        Ok(files)
    }

    async fn exists(&self, remote_path: &str) -> Result<bool> {
        let date = Self::date_header();
        let authorization =
            self.authorization("HEAD", "", &date, &self.object_resource(remote_path))?;

        let response = self
            .client
            .head(self.object_url(remote_path))
            .header("Date", &date)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if response.status().is_success() {
            return Ok(true);
        }
        Err(MbmError::storage(format!(
            "检查文件失败: HTTP {}",
            response.status()
        )))
    }

    async fn file_info(&self, remote_path: &str) -> Result<FileInfo> {
        let date = Self::date_header();
        let authorization =
            self.authorization("HEAD", "", &date, &self.object_resource(remote_path))?;

        let response = self
            .client
            .head(self.object_url(remote_path))
            .header("Date", &date)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;
        let response = ensure_success(response, "获取文件信息失败").await?;

        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let modified = response
            .headers()
            .get("Last-Modified")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(FileInfo {
            name: remote_path.to_string(),
            path: remote_path.to_string(),
            size,
            modified,
        })
    }

    async fn test_connection(&self) -> Result<()> {
        self.list_page("", "").await?;
        Ok(())
    }
}

async fn ensure_success(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(MbmError::storage(format!(
        "{context}: HTTP {status} {}",
        body.trim()
    )))
}

fn normalize_endpoint(endpoint: &str) -> String {
    endpoint
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

fn string_to_sign(verb: &str, content_type: &str, date: &str, resource: &str) -> String {
    // Content-MD5 不参与，留空行
    format!("{verb}\n\n{content_type}\n{date}\n{resource}")
}

fn hmac_sha1_base64(secret: &str, data: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| MbmError::custom("初始化HMAC失败"))?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

struct ListPage {
    files: Vec<FileInfo>,
    is_truncated: bool,
    next_marker: Option<String>,
}

/// 解析 ListObjects 响应（GetBucket 结果 XML）
fn parse_list_response(xml: &str) -> Result<ListPage> {
    let regex_err = |e: regex::Error| MbmError::custom(format!("构造正则失败: {e}"));
    let contents_re = Regex::new(r"(?s)<Contents>.*?</Contents>").map_err(regex_err)?;
    let key_re = Regex::new(r"<Key>([^<]*)</Key>").map_err(regex_err)?;
    let size_re = Regex::new(r"<Size>(\d+)</Size>").map_err(regex_err)?;
    let modified_re = Regex::new(r"<LastModified>([^<]*)</LastModified>").map_err(regex_err)?;
    let marker_re = Regex::new(r"<NextMarker>([^<]*)</NextMarker>").map_err(regex_err)?;

    let mut files = Vec::new();
    for block in contents_re.find_iter(xml) {
        let block = block.as_str();

        let Some(key) = key_re.captures(block).map(|c| c[1].to_string()) else {
            continue;
        };
        let size = size_re
            .captures(block)
            .and_then(|c| c[1].parse::<i64>().ok())
            .unwrap_or(0);
        let modified = modified_re
            .captures(block)
            .and_then(|c| DateTime::parse_from_rfc3339(&c[1]).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        files.push(FileInfo {
            name: key.clone(),
            path: key,
            size,
            modified,
        });
    }

    let is_truncated = xml.contains("<IsTruncated>true</IsTruncated>");
    let next_marker = marker_re.captures(xml).map(|c| c[1].to_string());

    Ok(ListPage {
        files,
        is_truncated,
        next_marker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_sign_layout() {
        let signed = string_to_sign(
            "PUT",
            "application/octet-stream",
            "Thu, 06 Aug 2026 02:00:00 GMT",
            "/backups/task_1/backup.tar.gz",
        );
        assert_eq!(
            signed,
            "PUT\n\napplication/octet-stream\nThu, 06 Aug 2026 02:00:00 GMT\n/backups/task_1/backup.tar.gz"
        );
    }

    #[test]
    fn test_hmac_sha1_known_vector() {
        let signature =
            hmac_sha1_base64("key", "The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(signature, "3nybhbi3iqa8ino29wqQcBydtNk=");
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("https://oss-cn-hangzhou.aliyuncs.com/"),
            "oss-cn-hangzhou.aliyuncs.com"
        );
        assert_eq!(
            normalize_endpoint("oss-cn-hangzhou.aliyuncs.com"),
            "oss-cn-hangzhou.aliyuncs.com"
        );
    }

    #[test]
    fn test_parse_list_response() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <Name>backups</Name>
  <IsTruncated>true</IsTruncated>
  <NextMarker>task_1/backup_b.tar.gz</NextMarker>
  <Contents>
    <Key>task_1/backup_a.tar.gz</Key>
    <LastModified>2026-08-01T02:00:13.000Z</LastModified>
    <Size>10485760</Size>
  </Contents>
  <Contents>
    <Key>task_1/backup_b.tar.gz</Key>
    <LastModified>2026-08-02T02:00:09.000Z</LastModified>
    <Size>10485761</Size>
  </Contents>
</ListBucketResult>"#;

        let page = parse_list_response(xml).unwrap();
        assert_eq!(page.files.len(), 2);
        assert_eq!(page.files[0].path, "task_1/backup_a.tar.gz");
        assert_eq!(page.files[0].size, 10485760);
        assert_eq!(page.files[0].modified.to_rfc3339(), "2026-08-01T02:00:13+00:00");
        assert!(page.is_truncated);
        assert_eq!(page.next_marker.as_deref(), Some("task_1/backup_b.tar.gz"));
    }

    #[test]
    fn test_parse_list_response_empty() {
        let xml = r#"<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>"#;
        let page = parse_list_response(xml).unwrap();
        assert!(page.files.is_empty());
        assert!(!page.is_truncated);
        assert!(page.next_marker.is_none());
    }
}
