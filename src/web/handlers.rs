use crate::{
    digits::{DigitPipeline, ImageSource},
    image::{postprocessing::PercentagePredictResponse, postprocessing::PredictResponse, ResultFormatter},
    utils::error::{DigitError, PercentageError},
    web::{extractors::RequestId, AppState},
    Result,
};
use axum::{extract::State, response::Json};
use serde_json::{json, Value};

/// 对外公布的接口列表
pub const ENDPOINTS: [&str; 7] = [
    "GET /",
    "GET /health",
    "GET /api/info",
    "GET /ui",
    "POST /predict",
    "POST /api/predict",
    "POST /reload",
];

/// 服务状态
pub async fn root_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "running",
        "model_loaded": state.models.is_loaded(),
        "endpoints": ENDPOINTS,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 健康检查端点
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.models.is_loaded(),
    }))
}

/// 服务信息端点
pub async fn info_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "ONNX Digit Recognition Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "model": state.models.stats(),
        "limits": {
            "max_request_size": state.config.server_config.max_request_size,
            "request_timeout_secs": state.config.server_config.request_timeout,
        },
    }))
}

/// 识别处理器：`{prediction, confidence, all_probabilities}`
pub async fn predict_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    source: ImageSource,
) -> Result<Json<PredictResponse>> {
    tracing::info!(
        "Processing predict request: request_id={}, source={}",
        request_id,
        source.describe()
    );

    let recognition = DigitPipeline::recognize(&state.models, source).await?;

    tracing::info!(
        "Prediction completed: request_id={}, digit={}, confidence={:.4}, inverted={}, mean={:.4}, time={:.3}s",
        request_id,
        recognition.prediction.digit,
        recognition.prediction.confidence,
        recognition.inverted,
        recognition.source_mean,
        recognition.elapsed.as_secs_f32()
    );

    Ok(Json(ResultFormatter::standard(
        &recognition.prediction,
        recognition.inverted,
    )))
}

/// 前端使用的识别处理器：百分比结果，`{success, ...}`
pub async fn api_predict_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    source: std::result::Result<ImageSource, DigitError>,
) -> std::result::Result<Json<PercentagePredictResponse>, PercentageError> {
    let source = source?;

    tracing::info!(
        "Processing api predict request: request_id={}, source={}",
        request_id,
        source.describe()
    );

    let recognition = DigitPipeline::recognize(&state.models, source).await?;

    tracing::info!(
        "Api prediction completed: request_id={}, digit={}, time={:.3}s",
        request_id,
        recognition.prediction.digit,
        recognition.elapsed.as_secs_f32()
    );

    Ok(Json(ResultFormatter::percentage(&recognition.prediction)))
}

/// 重新加载模型
pub async fn reload_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
) -> Result<Json<Value>> {
    tracing::info!("Reload requested: request_id={}", request_id);

    let models = state.models.clone();
    tokio::task::spawn_blocking(move || models.reload())
        .await
        .map_err(|e| DigitError::Internal(format!("Reload task failed: {}", e)))??;

    Ok(Json(json!({
        "status": "reloaded",
        "model_loaded": state.models.is_loaded(),
        "source": state.models.source(),
    })))
}
