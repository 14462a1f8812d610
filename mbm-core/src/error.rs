use thiserror::Error;

pub type Result<T> = std::result::Result<T, MbmError>;

#[derive(Error, Debug)]
pub enum MbmError {
    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("DuckDB数据库错误: {0}")]
    Db(String),

    #[error("HTTP 请求错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("ZIP 文件错误: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("目录遍历错误: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("路径错误: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    #[error("SSH 错误: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("调度配置错误: {0}")]
    Schedule(String),

    #[error("备份执行失败: {0}")]
    Execution(String),

    #[error("存储操作失败: {0}")]
    Storage(String),

    #[error("通知发送失败: {0}")]
    Notify(String),

    #[error("任务正在执行中")]
    TaskAlreadyRunning,

    #[error("记录不存在: {0}")]
    NotFound(String),

    #[error("自定义错误: {0}")]
    Custom(String),
}

// 为DuckDB错误实现From trait
impl From<duckdb::Error> for MbmError {
    fn from(err: duckdb::Error) -> Self {
        MbmError::Db(err.to_string())
    }
}

impl MbmError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn schedule(msg: impl Into<String>) -> Self {
        Self::Schedule(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
