use crate::config::ValidationConfig;
use crate::db::{InvoiceStore, SaveRequest};
use crate::error::{PersistenceError, QueryError, ValidationError};
use crate::models::{InvoiceRecord, LineItem, SearchQuerySpec};
use crate::service::{CsvExporter, PersistenceCoordinator, SearchService};
use crate::validation;
use axum::{
    body::Body,
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InvoiceStore>,
    pub persister: Arc<PersistenceCoordinator>,
    pub search: Arc<SearchService>,
    pub validation: ValidationConfig,
}

/// 保存请求体: 抽取层产出的松散字段映射 + 去重标识
#[derive(Debug, Deserialize)]
pub struct SaveInvoiceRequest {
    pub invoice_id: i64,
    pub user_id: i64,
    pub attempt_id: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct SaveInvoiceResponse {
    pub invoice: InvoiceRecord,
    pub line_items: Vec<LineItem>,
}

/// 校验失败响应: 一次返回全部违规项
#[derive(Debug, Serialize)]
pub struct ValidationFailureResponse {
    pub errors: Vec<ValidationError>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl ErrorResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 保存发票: 校验 → 持久化
pub async fn save_invoice(
    State(state): State<AppState>,
    Json(req): Json<SaveInvoiceRequest>,
) -> Response {
    let normalized = match validation::validate(&req.data, &state.validation) {
        Ok(n) => n,
        Err(errors) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ValidationFailureResponse { errors }),
            )
                .into_response()
        }
    };

    let save_req = SaveRequest {
        invoice_id: req.invoice_id,
        user_id: req.user_id,
        attempt_id: req.attempt_id,
        invoice: normalized,
    };

    match state.persister.save(&save_req).await {
        Ok(invoice) => {
            // 保存已提交; 回读失败不能伪装成空明细的成功
            let line_items = match state.store.list_line_items(invoice.id).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::error!(
                        "invoice {} saved but line items could not be read back: {}",
                        invoice.id,
                        e
                    );
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(ErrorResponse::new(format!(
                            "invoice {} was saved but its line items could not be read back",
                            invoice.id
                        ))),
                    )
                        .into_response();
                }
            };
            (StatusCode::OK, Json(SaveInvoiceResponse { invoice, line_items })).into_response()
        }
        Err(PersistenceError::Conflict(msg)) => {
            (StatusCode::CONFLICT, Json(ErrorResponse::new(msg))).into_response()
        }
        Err(e @ PersistenceError::RetriesExhausted { .. }) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(format!("{}, please try again later", e))),
        )
            .into_response(),
    }
}

/// 搜索请求体
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub user_id: i64,
    #[serde(flatten)]
    pub spec: SearchQuerySpec,
}

fn query_error_response(e: QueryError) -> Response {
    let status = match e {
        QueryError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(ErrorResponse::new(e.to_string()))).into_response()
}

/// 搜索发票
pub async fn search_invoices(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Response {
    match state.search.search(req.user_id, &req.spec).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => query_error_response(e),
    }
}

/// 用户统计 (只读)
pub async fn user_statistics(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Response {
    match state.store.user_statistics(user_id).await {
        Ok(Some(stats)) => (StatusCode::OK, Json(stats)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("no statistics for user {}", user_id))),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

type BoxErr = Box<dyn std::error::Error + Send + Sync>;

/// 导出搜索结果为 CSV: 逐页取数, 每页编码成一个字节块流式写出,
/// 结果集从不整体驻留内存
pub async fn export_invoices(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Response {
    let mut spec = req.spec.clone();
    spec.page = 1;

    // 第一页在流开始前取: 请求参数错误此时还能以状态码返回
    let first = match state.search.search(req.user_id, &spec).await {
        Ok(p) => p,
        Err(e) => return query_error_response(e),
    };

    let search = state.search.clone();
    let user_id = req.user_id;
    let body = stream::try_unfold(
        (search, spec, Some(first), true, false),
        move |(search, mut spec, pending, first_chunk, done)| async move {
            if done {
                return Ok::<_, BoxErr>(None);
            }
            let page = match pending {
                Some(p) => p,
                None => {
                    spec.page += 1;
                    search.search(user_id, &spec).await?
                }
            };
            let mut exporter = if first_chunk {
                CsvExporter::new(Vec::new())?
            } else {
                CsvExporter::append(Vec::new())
            };
            for record in &page.records {
                exporter.write_record(record)?;
            }
            let bytes = exporter.into_bytes()?;
            let finished = page.records.is_empty()
                || (page.page as i64) * (page.page_size as i64) >= page.total_matched;
            Ok(Some((bytes, (search, spec, None, false, finished))))
        },
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/csv")],
        Body::from_stream(body),
    )
        .into_response()
}
