use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use toml;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub backup: BackupConfig,
}

/// 数据库相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

/// 备份相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackupConfig {
    /// 备份执行时的本地临时工作目录
    pub tmp_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "./data/mbm.db".to_string(),
            },
            backup: BackupConfig {
                tmp_dir: "./data/tmp".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：config.toml -> mbm.toml -> .mbm.toml
    pub fn find_and_load_config() -> Result<Self> {
        let config_files = ["config.toml", "mbm.toml", ".mbm.toml"];

        for config_file in &config_files {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        // 如果没找到配置文件，创建默认配置
        tracing::warn!("未找到配置文件，创建默认配置: config.toml");
        let default_config = Self::default();
        default_config.save_to_file("config.toml")?;
        Ok(default_config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::MbmError::custom(format!("序列化配置失败: {e}")))?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// 确保工作目录存在
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.backup.tmp_dir)?;
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::default();
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.database.path, config.database.path);
        assert_eq!(loaded.backup.tmp_dir, config.backup.tmp_dir);
    }
}
