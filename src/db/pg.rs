use crate::db::{InvoiceStore, SaveRequest};
use crate::error::StoreError;
use crate::models::{InvoiceRecord, LineItem, SearchQuerySpec, UserStatistics};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

const INVOICE_COLUMNS: &str = "id, user_id, vendor_name, invoice_number, invoice_date, \
     total_amount, currency, email, status, created_at, updated_at";

/// Postgres 存储后端
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn fetch_invoice(
    tx: &mut Transaction<'_, Postgres>,
    invoice_id: i64,
) -> Result<InvoiceRecord, StoreError> {
    sqlx::query_as::<_, InvoiceRecord>(&format!(
        "SELECT {} FROM invoices WHERE id = $1",
        INVOICE_COLUMNS
    ))
    .bind(invoice_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(StoreError::from_sqlx)
}

/// 把 spec 的过滤条件追加到 WHERE 子句 (全部 AND 组合, 只用绑定参数)
fn push_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, spec: &SearchQuerySpec) {
    if let Some(text) = spec.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = format!("%{}%", escape_like(text));
        qb.push(" AND (vendor_name ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR invoice_number ILIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
    if let Some(status) = &spec.status {
        qb.push(" AND status = ");
        qb.push_bind(status.clone());
    }
    if let Some(currency) = &spec.currency {
        qb.push(" AND currency = ");
        qb.push_bind(currency.clone());
    }
    if let Some(from) = spec.date_from {
        qb.push(" AND invoice_date >= ");
        qb.push_bind(from);
    }
    if let Some(to) = spec.date_to {
        qb.push(" AND invoice_date <= ");
        qb.push_bind(to);
    }
}

/// 转义 LIKE 通配符, 用户输入按字面匹配
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl InvoiceStore for PgStore {
    async fn save_invoice(&self, req: &SaveRequest) -> Result<InvoiceRecord, StoreError> {
        // 提前退出时事务随 drop 回滚, 不留部分写入
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        // 事务级咨询锁串行化同一发票的全部并发保存。行锁 (FOR UPDATE) 对
        // 尚不存在的行锁不住: 两个首次创建的事务会同时读到 existing = None,
        // 统计就会重复累加, 归属预检也会被绕过
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(req.invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

        // 归属检查; 锁后读取, READ COMMITTED 下语句能看到最新已提交状态
        let existing: Option<(i64, BigDecimal)> =
            sqlx::query_as("SELECT user_id, total_amount FROM invoices WHERE id = $1")
                .bind(req.invoice_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;

        if let Some((owner, _)) = &existing {
            if *owner != req.user_id {
                return Err(StoreError::Conflict(format!(
                    "invoice {} does not belong to user {}",
                    req.invoice_id, req.user_id
                )));
            }
        }

        // attempt 去重: 已记录说明本次逻辑保存已提交过, 返回现状且不动统计
        let attempt = sqlx::query(
            "INSERT INTO save_attempts (attempt_id, invoice_id) VALUES ($1, $2) \
             ON CONFLICT (attempt_id) DO NOTHING",
        )
        .bind(&req.attempt_id)
        .bind(req.invoice_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        if attempt.rows_affected() == 0 {
            let record = fetch_invoice(&mut tx, req.invoice_id).await?;
            tx.commit().await.map_err(StoreError::from_sqlx)?;
            tracing::info!(
                "attempt {} already applied to invoice {}, skipping",
                req.attempt_id,
                req.invoice_id
            );
            return Ok(record);
        }

        // 表头 upsert
        let record: InvoiceRecord = sqlx::query_as(&format!(
            "INSERT INTO invoices \
                 (id, user_id, vendor_name, invoice_number, invoice_date, \
                  total_amount, currency, email, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'processed', now(), now()) \
             ON CONFLICT (id) DO UPDATE SET \
                 vendor_name = EXCLUDED.vendor_name, \
                 invoice_number = EXCLUDED.invoice_number, \
                 invoice_date = EXCLUDED.invoice_date, \
                 total_amount = EXCLUDED.total_amount, \
                 currency = EXCLUDED.currency, \
                 email = EXCLUDED.email, \
                 status = EXCLUDED.status, \
                 updated_at = now() \
             RETURNING {}",
            INVOICE_COLUMNS
        ))
        .bind(req.invoice_id)
        .bind(req.user_id)
        .bind(&req.invoice.vendor_name)
        .bind(&req.invoice.invoice_number)
        .bind(req.invoice.invoice_date)
        .bind(req.invoice.total_amount.clone())
        .bind(&req.invoice.currency)
        .bind(&req.invoice.email)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        // 明细整组替换
        sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
            .bind(req.invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;

        if !req.invoice.line_items.is_empty() {
            let mut qb = QueryBuilder::new(
                "INSERT INTO invoice_items \
                 (invoice_id, line_no, description, quantity, unit_price, subtotal) ",
            );
            qb.push_values(
                req.invoice.line_items.iter().enumerate(),
                |mut b, (idx, item)| {
                    b.push_bind(req.invoice_id)
                        .push_bind(idx as i32 + 1)
                        .push_bind(&item.description)
                        .push_bind(item.quantity.clone())
                        .push_bind(item.unit_price.clone())
                        .push_bind(item.subtotal.clone());
                },
            );
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;
        }

        // 统计增量: 新发票 count+1, 更新只调整金额差值
        let (count_delta, sum_delta) = match &existing {
            Some((_, old_total)) => (0i64, &req.invoice.total_amount - old_total),
            None => (1i64, req.invoice.total_amount.clone()),
        };
        sqlx::query(
            "INSERT INTO user_statistics (user_id, invoice_count, total_amount, last_processed_at) \
             VALUES ($1, $2, $3, now()) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 invoice_count = user_statistics.invoice_count + EXCLUDED.invoice_count, \
                 total_amount = user_statistics.total_amount + EXCLUDED.total_amount, \
                 last_processed_at = now()",
        )
        .bind(req.user_id)
        .bind(count_delta)
        .bind(sum_delta)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(record)
    }

    async fn search_invoices(
        &self,
        user_id: i64,
        spec: &SearchQuerySpec,
    ) -> Result<(Vec<InvoiceRecord>, i64), StoreError> {
        // 命中总数与当前页使用同一组过滤条件
        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT count(*) FROM invoices WHERE user_id = ");
        count_qb.push_bind(user_id);
        push_filters(&mut count_qb, spec);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM invoices WHERE user_id = ",
            INVOICE_COLUMNS
        ));
        qb.push_bind(user_id);
        push_filters(&mut qb, spec);

        // 排序键来自白名单列名; id 升序兜底保证分页确定性
        qb.push(format!(
            " ORDER BY {} {} NULLS LAST, id ASC",
            spec.sort_by.column(),
            spec.sort_dir.sql()
        ));
        qb.push(" LIMIT ");
        qb.push_bind(spec.page_size as i64);
        qb.push(" OFFSET ");
        qb.push_bind((spec.page as i64 - 1) * spec.page_size as i64);

        let records = qb
            .build_query_as::<InvoiceRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        Ok((records, total))
    }

    async fn list_line_items(&self, invoice_id: i64) -> Result<Vec<LineItem>, StoreError> {
        sqlx::query_as::<_, LineItem>(
            "SELECT invoice_id, line_no, description, quantity, unit_price, subtotal \
             FROM invoice_items WHERE invoice_id = $1 ORDER BY line_no ASC",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn user_statistics(
        &self,
        user_id: i64,
    ) -> Result<Option<UserStatistics>, StoreError> {
        sqlx::query_as::<_, UserStatistics>(
            "SELECT user_id, invoice_count, total_amount, last_processed_at \
             FROM user_statistics WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }
}
