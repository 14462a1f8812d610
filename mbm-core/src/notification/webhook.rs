use super::{BackupNotification, Notifier};
use crate::{MbmError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// webhook 渠道配置
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// 附加请求头（鉴权token等）
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// webhook 通知器：把结构化结果以 JSON POST 出去，渲染交给接收方
pub struct WebhookNotifier {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn from_config(config_json: &str) -> Result<Self> {
        let config: WebhookConfig = serde_json::from_str(config_json)
            .map_err(|e| MbmError::validation(format!("webhook 配置解析失败: {e}")))?;
        if config.url.trim().is_empty() {
            return Err(MbmError::validation("webhook 配置缺少 url"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &BackupNotification) -> Result<()> {
        let mut request = self.client.post(&self.config.url).json(notification);
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(MbmError::Notify(format!(
                "webhook 返回 HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_requires_url() {
        assert!(WebhookNotifier::from_config("{}").is_err());
        assert!(WebhookNotifier::from_config(r#"{"url":""}"#).is_err());
        assert!(WebhookNotifier::from_config("not json").is_err());
        assert!(
            WebhookNotifier::from_config(
                r#"{"url":"https://hooks.example.com/backup","headers":{"X-Token":"t"}}"#
            )
            .is_ok()
        );
    }
}
