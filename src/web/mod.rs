pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod ui;

use crate::{
    models::{ModelManager, OnnxModelLoader},
    utils::error::DigitError,
    Config, Result,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub models: Arc<ModelManager>,
}

impl AppState {
    pub fn new(config: Config, models: ModelManager) -> Self {
        Self {
            config: Arc::new(config),
            models: Arc::new(models),
        }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    let models = load_models(&config).await?;

    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        DigitError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    let app = create_app(AppState::new(config, models));

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /predict     - multipart or JSON base64, raw probabilities");
    tracing::info!("  POST /api/predict - multipart or JSON base64, percentages");
    tracing::info!("  POST /reload      - Reload model artifact");
    tracing::info!("  GET  /            - Service status");
    tracing::info!("  GET  /health      - Health check");
    tracing::info!("  GET  /api/info    - Service information");
    tracing::info!("  GET  /ui          - Web UI");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        DigitError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DigitError::Internal(format!("Server failed: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

/// 在阻塞线程池上加载模型；加载失败不阻止启动，服务报告不可用
async fn load_models(config: &Config) -> Result<ModelManager> {
    let loader = Arc::new(OnnxModelLoader::new(config.clone()));
    let input_layout = config.input_layout;
    tokio::task::spawn_blocking(move || ModelManager::initialize(loader, input_layout))
        .await
        .map_err(|e| DigitError::Internal(format!("Model initialization task failed: {}", e)))
}

pub fn create_app(state: AppState) -> Router {
    let server_config = state.config.server_config.clone();

    Router::new()
        // 识别API路由
        .route("/predict", post(handlers::predict_handler))
        .route("/api/predict", post(handlers::api_predict_handler))
        .route("/reload", post(handlers::reload_handler))
        // 系统路由
        .route("/", get(handlers::root_handler))
        .route("/health", get(handlers::health_handler))
        .route("/api/info", get(handlers::info_handler))
        // Web UI路由
        .route("/ui", get(ui::index_handler))
        // 添加中间件
        .layer(DefaultBodyLimit::max(server_config.max_request_size))
        .layer(RequestBodyLimitLayer::new(server_config.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(server_config.request_timeout)))
        // 上面两层的拒绝响应是纯文本，在这里统一改写为JSON
        .layer(axum::middleware::from_fn_with_state(
            server_config,
            middleware::json_rejections,
        ))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
