use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// 校验错误 (单个字段), 聚合成列表返回给调用方, 不落库
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// 存储层错误分类: 冲突 (不重试) / 瞬时 (可重试)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store conflict: {0}")]
    Conflict(String),
    #[error("transient store failure: {0}")]
    Transient(String),
}

impl StoreError {
    /// 按 SQLSTATE 分类 sqlx 错误
    /// 40001 serialization_failure / 40P01 deadlock_detected 视为瞬时可重试
    pub fn from_sqlx(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("40001") | Some("40P01") => StoreError::Transient(e.to_string()),
                _ => StoreError::Conflict(e.to_string()),
            },
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Transient(e.to_string())
            }
            _ => StoreError::Conflict(e.to_string()),
        }
    }
}

/// 持久化错误: 冲突立即上抛, 瞬时错误重试耗尽后以独立类别上抛
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("persistence conflict: {0}")]
    Conflict(String),
    #[error("storage unavailable after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// 搜索请求错误: 立即上抛, 从不重试
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("page must be >= 1")]
    InvalidPage,
    #[error("page_size must be >= 1")]
    InvalidPageSize,
    #[error("date_from {from} is later than date_to {to}")]
    ReversedDateRange { from: NaiveDate, to: NaiveDate },
    #[error("search timed out")]
    Timeout,
    #[error("store failure during search: {0}")]
    Store(String),
}
