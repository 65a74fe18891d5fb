use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 用户维度统计 (UserStatistics)
/// 只在保存事务内部更新, 对外只读
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserStatistics {
    pub user_id: i64,
    pub invoice_count: i64,
    pub total_amount: BigDecimal,
    pub last_processed_at: DateTime<Utc>,
}
