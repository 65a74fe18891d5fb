use crate::models::InvoiceRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 搜索请求 (每次调用构造, 不持久化)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuerySpec {
    /// 自由文本, 大小写不敏感匹配 vendor_name 或 invoice_number
    pub text: Option<String>,
    pub status: Option<String>,
    pub currency: Option<String>,
    /// 含下界
    pub date_from: Option<NaiveDate>,
    /// 含上界
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub sort_by: SortKey,
    #[serde(default)]
    pub sort_dir: SortDirection,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

impl Default for SearchQuerySpec {
    fn default() -> Self {
        Self {
            text: None,
            status: None,
            currency: None,
            date_from: None,
            date_to: None,
            sort_by: SortKey::default(),
            sort_dir: SortDirection::default(),
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

/// 排序键 (一次只允许一个; id 升序兜底由存储层固定追加)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    InvoiceDate,
    TotalAmount,
    VendorName,
}

impl SortKey {
    /// 映射到白名单列名, 排序子句从不拼接用户输入
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::InvoiceDate => "invoice_date",
            SortKey::TotalAmount => "total_amount",
            SortKey::VendorName => "vendor_name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// 搜索结果页
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub records: Vec<InvoiceRecord>,
    /// 命中总数 (不受分页影响)
    pub total_matched: i64,
    pub page: u32,
    pub page_size: u32,
}
