use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use invoice_pipeline_rust::db::{InvoiceStore, SaveRequest};
use invoice_pipeline_rust::error::StoreError;
use invoice_pipeline_rust::models::{
    InvoiceRecord, LineItem, NormalizedInvoice, NormalizedLineItem, SearchQuerySpec,
    SortDirection, SortKey, UserStatistics,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct State {
    invoices: HashMap<i64, InvoiceRecord>,
    items: HashMap<i64, Vec<LineItem>>,
    stats: HashMap<i64, UserStatistics>,
    attempts: HashMap<String, i64>,
}

/// 内存版存储后端, 驱动协调器/搜索的集成测试
///
/// save_invoice 与 Postgres 实现语义一致: 归属检查 → attempt 去重 →
/// 表头 → 明细 → 统计; 所有状态修改在末尾一次落地, 注入的失败
/// 发生在落地之前, 等价于事务回滚。
#[derive(Default)]
pub struct MemStore {
    state: Mutex<State>,
    fail_item_writes: AtomicU32,
    fail_transient: AtomicU32,
    fail_item_reads: AtomicU32,
    delay_ms: AtomicU64,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注入: 接下来 n 次保存在明细写入阶段失败 (瞬时)
    pub fn inject_item_write_failures(&self, n: u32) {
        self.fail_item_writes.store(n, Ordering::SeqCst);
    }

    /// 注入: 接下来 n 次保存在事务开头即瞬时失败
    pub fn inject_transient_failures(&self, n: u32) {
        self.fail_transient.store(n, Ordering::SeqCst);
    }

    /// 注入: 接下来 n 次明细回读失败
    pub fn inject_item_read_failures(&self, n: u32) {
        self.fail_item_reads.store(n, Ordering::SeqCst);
    }

    /// 注入: 每次保存/搜索先阻塞 ms 毫秒, 用于触发截止时间
    pub fn inject_delay_ms(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    async fn injected_delay(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    pub fn invoice(&self, id: i64) -> Option<InvoiceRecord> {
        self.state.lock().unwrap().invoices.get(&id).cloned()
    }

    pub fn line_items(&self, invoice_id: i64) -> Vec<LineItem> {
        self.state
            .lock()
            .unwrap()
            .items
            .get(&invoice_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stats(&self, user_id: i64) -> Option<UserStatistics> {
        self.state.lock().unwrap().stats.get(&user_id).cloned()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl InvoiceStore for MemStore {
    async fn save_invoice(&self, req: &SaveRequest) -> Result<InvoiceRecord, StoreError> {
        self.injected_delay().await;
        let mut state = self.state.lock().unwrap();

        if take_one(&self.fail_transient) {
            return Err(StoreError::Transient("injected transient failure".into()));
        }

        // 归属检查
        if let Some(existing) = state.invoices.get(&req.invoice_id) {
            if existing.user_id != req.user_id {
                return Err(StoreError::Conflict(format!(
                    "invoice {} does not belong to user {}",
                    req.invoice_id, req.user_id
                )));
            }
        }

        // attempt 去重: 返回现状, 统计不动
        if state.attempts.contains_key(&req.attempt_id) {
            return state
                .invoices
                .get(&req.invoice_id)
                .cloned()
                .ok_or_else(|| {
                    StoreError::Conflict("attempt recorded without invoice".into())
                });
        }

        // 明细写入阶段的注入失败: 此时尚未落地任何状态
        if take_one(&self.fail_item_writes) {
            return Err(StoreError::Transient(
                "injected line item write failure".into(),
            ));
        }

        let now = Utc::now();
        let previous = state.invoices.get(&req.invoice_id).cloned();
        let record = InvoiceRecord {
            id: req.invoice_id,
            user_id: req.user_id,
            vendor_name: req.invoice.vendor_name.clone(),
            invoice_number: req.invoice.invoice_number.clone(),
            invoice_date: req.invoice.invoice_date,
            total_amount: req.invoice.total_amount.clone(),
            currency: req.invoice.currency.clone(),
            email: req.invoice.email.clone(),
            status: "processed".to_string(),
            created_at: previous.as_ref().map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        };
        let items: Vec<LineItem> = req
            .invoice
            .line_items
            .iter()
            .enumerate()
            .map(|(idx, li)| LineItem {
                invoice_id: req.invoice_id,
                line_no: idx as i32 + 1,
                description: li.description.clone(),
                quantity: li.quantity.clone(),
                unit_price: li.unit_price.clone(),
                subtotal: li.subtotal.clone(),
            })
            .collect();

        // 一次性落地 (相当于 commit)
        {
            let entry = state
                .stats
                .entry(req.user_id)
                .or_insert_with(|| UserStatistics {
                    user_id: req.user_id,
                    invoice_count: 0,
                    total_amount: BigDecimal::from(0),
                    last_processed_at: now,
                });
            match &previous {
                Some(p) => {
                    entry.total_amount =
                        &entry.total_amount - &p.total_amount + &record.total_amount;
                }
                None => {
                    entry.invoice_count += 1;
                    entry.total_amount = &entry.total_amount + &record.total_amount;
                }
            }
            entry.last_processed_at = now;
        }
        state.attempts.insert(req.attempt_id.clone(), req.invoice_id);
        state.invoices.insert(req.invoice_id, record.clone());
        state.items.insert(req.invoice_id, items);

        Ok(record)
    }

    async fn search_invoices(
        &self,
        user_id: i64,
        spec: &SearchQuerySpec,
    ) -> Result<(Vec<InvoiceRecord>, i64), StoreError> {
        self.injected_delay().await;
        let state = self.state.lock().unwrap();
        let term = spec
            .text
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty());

        let mut matched: Vec<InvoiceRecord> = state
            .invoices
            .values()
            .filter(|r| r.user_id == user_id)
            .filter(|r| {
                term.as_ref().map_or(true, |t| {
                    r.vendor_name.to_lowercase().contains(t)
                        || r.invoice_number.to_lowercase().contains(t)
                })
            })
            .filter(|r| spec.status.as_ref().map_or(true, |s| &r.status == s))
            .filter(|r| spec.currency.as_ref().map_or(true, |c| &r.currency == c))
            .filter(|r| {
                spec.date_from
                    .map_or(true, |d| r.invoice_date.map_or(false, |x| x >= d))
            })
            .filter(|r| {
                spec.date_to
                    .map_or(true, |d| r.invoice_date.map_or(false, |x| x <= d))
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ord = match spec.sort_by {
                SortKey::InvoiceDate => a.invoice_date.cmp(&b.invoice_date),
                SortKey::TotalAmount => a.total_amount.cmp(&b.total_amount),
                SortKey::VendorName => a.vendor_name.cmp(&b.vendor_name),
            };
            let ord = match spec.sort_dir {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            ord.then(a.id.cmp(&b.id))
        });

        let total = matched.len() as i64;
        let start = (spec.page as usize - 1) * spec.page_size as usize;
        let page: Vec<InvoiceRecord> = matched
            .into_iter()
            .skip(start)
            .take(spec.page_size as usize)
            .collect();

        Ok((page, total))
    }

    async fn list_line_items(&self, invoice_id: i64) -> Result<Vec<LineItem>, StoreError> {
        if take_one(&self.fail_item_reads) {
            return Err(StoreError::Transient(
                "injected line item read failure".into(),
            ));
        }
        Ok(self.line_items(invoice_id))
    }

    async fn user_statistics(
        &self,
        user_id: i64,
    ) -> Result<Option<UserStatistics>, StoreError> {
        Ok(self.stats(user_id))
    }
}

/// 构造一张规范化发票, 明细两行小计之和等于 total
pub fn normalized_invoice(vendor: &str, number: &str, date: &str, total: i64) -> NormalizedInvoice {
    NormalizedInvoice {
        vendor_name: vendor.to_string(),
        invoice_number: number.to_string(),
        invoice_date: chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
        total_amount: BigDecimal::from(total),
        currency: "USD".to_string(),
        email: None,
        line_items: vec![NormalizedLineItem {
            description: "item".to_string(),
            quantity: BigDecimal::from(1),
            unit_price: BigDecimal::from(total),
            subtotal: BigDecimal::from(total),
        }],
    }
}
