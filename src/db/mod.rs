pub mod pg;
pub mod pool;

pub use pg::PgStore;
pub use pool::create_pool;

use crate::error::StoreError;
use crate::models::{InvoiceRecord, LineItem, NormalizedInvoice, SearchQuerySpec, UserStatistics};
use async_trait::async_trait;

/// 一次保存请求 (载荷已通过校验引擎)
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub invoice_id: i64,
    pub user_id: i64,
    /// 调用方提供的重试去重标识
    pub attempt_id: String,
    pub invoice: NormalizedInvoice,
}

/// 存储后端抽象: 保存事务与读路径
///
/// 生产后端为 Postgres (PgStore); 协调器与搜索服务只依赖该 trait,
/// 集成测试用内存实现驱动。
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// 原子保存: 归属检查 + attempt 去重 + 表头 upsert + 明细整组替换 + 统计增量
    /// 全部在单个事务内, 任一步失败则整体回滚
    async fn save_invoice(&self, req: &SaveRequest) -> Result<InvoiceRecord, StoreError>;

    /// 搜索 (spec 已由 SearchService 校验并钳制)
    /// 返回 (当前页记录, 命中总数)
    async fn search_invoices(
        &self,
        user_id: i64,
        spec: &SearchQuerySpec,
    ) -> Result<(Vec<InvoiceRecord>, i64), StoreError>;

    /// 查询发票明细行 (按 line_no 升序)
    async fn list_line_items(&self, invoice_id: i64) -> Result<Vec<LineItem>, StoreError>;

    /// 用户统计, 对外只读
    async fn user_statistics(&self, user_id: i64)
        -> Result<Option<UserStatistics>, StoreError>;
}
