use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 发票主表 (InvoiceRecord)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: i64,
    pub user_id: i64,
    pub vendor_name: String,
    pub invoice_number: String,
    pub invoice_date: Option<NaiveDate>,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub email: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 发票明细行 (LineItem), 随保存整组替换
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LineItem {
    pub invoice_id: i64,
    pub line_no: i32,
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub subtotal: BigDecimal,
}

/// 校验通过后的规范化发票 (类型已转换, 默认值已填充)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedInvoice {
    pub vendor_name: String,
    pub invoice_number: String,
    pub invoice_date: Option<NaiveDate>,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub email: Option<String>,
    pub line_items: Vec<NormalizedLineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedLineItem {
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub subtotal: BigDecimal,
}
