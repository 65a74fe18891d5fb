use crate::config::SearchConfig;
use crate::db::InvoiceStore;
use crate::error::QueryError;
use crate::models::{SearchPage, SearchQuerySpec};
use std::sync::Arc;
use std::time::Duration;

/// 搜索服务: 请求参数校验/钳制后下发存储层, 只读不加锁
pub struct SearchService {
    store: Arc<dyn InvoiceStore>,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(store: Arc<dyn InvoiceStore>, config: SearchConfig) -> Self {
        Self { store, config }
    }

    pub async fn search(
        &self,
        user_id: i64,
        spec: &SearchQuerySpec,
    ) -> Result<SearchPage, QueryError> {
        let spec = check_spec(spec, &self.config)?;

        let deadline = Duration::from_secs(self.config.search_deadline_secs);
        let (records, total_matched) =
            tokio::time::timeout(deadline, self.store.search_invoices(user_id, &spec))
                .await
                .map_err(|_| QueryError::Timeout)?
                .map_err(|e| QueryError::Store(e.to_string()))?;

        Ok(SearchPage {
            records,
            total_matched,
            page: spec.page,
            page_size: spec.page_size,
        })
    }
}

/// 请求校验: 页码/页大小为正, 日期区间不得倒置; page_size 钳制到配置上限
fn check_spec(spec: &SearchQuerySpec, config: &SearchConfig) -> Result<SearchQuerySpec, QueryError> {
    if spec.page < 1 {
        return Err(QueryError::InvalidPage);
    }
    if spec.page_size < 1 {
        return Err(QueryError::InvalidPageSize);
    }
    if let (Some(from), Some(to)) = (spec.date_from, spec.date_to) {
        if from > to {
            return Err(QueryError::ReversedDateRange { from, to });
        }
    }

    let mut spec = spec.clone();
    spec.page_size = spec.page_size.min(config.max_page_size);
    Ok(spec)
}
