use crate::config::PersistenceConfig;
use crate::db::{InvoiceStore, SaveRequest};
use crate::error::{PersistenceError, StoreError};
use crate::models::InvoiceRecord;
use std::sync::Arc;
use std::time::Duration;

/// 持久化协调器
///
/// 事务本身由存储后端执行; 这里负责重试策略: 冲突立即上抛,
/// 瞬时失败按指数退避重试, 每次尝试受截止时间约束。
/// 重试携带同一 attempt_id, 后端据此去重, 统计不会重复累加。
pub struct PersistenceCoordinator {
    store: Arc<dyn InvoiceStore>,
    config: PersistenceConfig,
}

impl PersistenceCoordinator {
    pub fn new(store: Arc<dyn InvoiceStore>, config: PersistenceConfig) -> Self {
        Self { store, config }
    }

    /// 保存一张已校验的发票 (表头 + 明细 + 用户统计, 原子)
    pub async fn save(&self, req: &SaveRequest) -> Result<InvoiceRecord, PersistenceError> {
        let deadline = Duration::from_secs(self.config.save_deadline_secs);
        let mut backoff = Duration::from_millis(self.config.backoff_base_ms);
        let mut last_err = String::new();

        for attempt in 1..=self.config.max_attempts {
            match tokio::time::timeout(deadline, self.store.save_invoice(req)).await {
                Ok(Ok(record)) => {
                    tracing::info!(
                        "invoice {} saved for user {} (attempt {})",
                        req.invoice_id,
                        req.user_id,
                        attempt
                    );
                    return Ok(record);
                }
                // 归属/引用冲突不重试
                Ok(Err(StoreError::Conflict(msg))) => {
                    tracing::warn!("save of invoice {} rejected: {}", req.invoice_id, msg);
                    return Err(PersistenceError::Conflict(msg));
                }
                Ok(Err(StoreError::Transient(msg))) => {
                    tracing::warn!(
                        "transient failure saving invoice {} (attempt {}/{}): {}",
                        req.invoice_id,
                        attempt,
                        self.config.max_attempts,
                        msg
                    );
                    last_err = msg;
                }
                // 超时取消只发生在事务边界: future 丢弃即回滚
                Err(_) => {
                    tracing::warn!(
                        "save of invoice {} timed out after {:?} (attempt {}/{})",
                        req.invoice_id,
                        deadline,
                        attempt,
                        self.config.max_attempts
                    );
                    last_err = format!("timed out after {:?}", deadline);
                }
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(PersistenceError::RetriesExhausted {
            attempts: self.config.max_attempts,
            last: last_err,
        })
    }
}
