use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 数据库主机，核心只读
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
