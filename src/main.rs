use axum::{
    routing::{get, post},
    Router,
};
use invoice_pipeline_rust::{
    api, create_pool, AppConfig, InvoiceStore, PersistenceCoordinator, PgStore, SearchService,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env();
    info!("Starting server with config: {:?}", config);

    // 创建数据库连接池
    let pool = create_pool(&config.database).await?;
    info!("Database pool created");

    // 组装核心服务: 校验是纯函数, 协调器与搜索共享同一存储后端
    let store: Arc<dyn InvoiceStore> = Arc::new(PgStore::new(pool));
    let persister = Arc::new(PersistenceCoordinator::new(
        store.clone(),
        config.persistence.clone(),
    ));
    let search = Arc::new(SearchService::new(store.clone(), config.search.clone()));

    let state = api::AppState {
        store,
        persister,
        search,
        validation: config.validation.clone(),
    };

    // 构建路由
    let app = Router::new()
        .route("/health", get(api::health_check))
        .route("/api/invoices", post(api::save_invoice))
        .route("/api/invoices/search", post(api::search_invoices))
        .route("/api/invoices/export", post(api::export_invoices))
        .route("/api/stats/:user_id", get(api::user_statistics))
        .with_state(state)
        .layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/invoices         - validate + save");
    info!("  POST /api/invoices/search  - search / filter / paginate");
    info!("  POST /api/invoices/export  - CSV export of search results");
    info!("  GET  /api/stats/:user_id   - per-user statistics (read-only)");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
