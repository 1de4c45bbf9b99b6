use crate::config::ServerConfig;
use crate::utils::error::DigitError;
use crate::web::extractors::RequestId;
use axum::{
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// 请求日志中间件，同时分配并回传请求ID
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let request_id = req
        .headers()
        .get(RequestId::HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let start_time = Instant::now();
    tracing::debug!("Request started: {} {} [{}]", method, uri, request_id);

    let mut response = next.run(req).await;

    tracing::info!(
        "Request completed: {} {} - {} - {}ms [{}]",
        method,
        uri,
        response.status(),
        start_time.elapsed().as_millis(),
        request_id
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(RequestId::HEADER), value);
    }

    response
}

/// 安全头中间件
pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));

    response
}

/// 把tower-http层产生的纯文本413/408改写为JSON错误
pub async fn json_rejections(
    State(limits): State<ServerConfig>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    // 提取器在读取请求体超限时用它报告上限
    req.extensions_mut().insert(limits.clone());
    let response = next.run(req).await;

    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    if is_json {
        return response;
    }

    let err = match response.status() {
        StatusCode::PAYLOAD_TOO_LARGE => DigitError::RequestTooLarge(limits.max_request_size),
        StatusCode::REQUEST_TIMEOUT => DigitError::Timeout(limits.request_timeout),
        _ => return response,
    };

    err.into_response_for(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        routing::post,
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn router(status: StatusCode) -> Router {
        let limits = ServerConfig {
            request_timeout: 7,
            max_request_size: 1024,
        };
        let handler = move || async move { (status, "plain text") };
        Router::new()
            .route("/predict", post(handler))
            .route("/api/predict", post(handler))
            .layer(axum::middleware::from_fn_with_state(limits, json_rejections))
    }

    async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn timeout_becomes_json() {
        let (status, body) = call(router(StatusCode::REQUEST_TIMEOUT), "/predict").await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["code"], "REQUEST_TIMEOUT");
        assert!(body["error"].as_str().unwrap().contains("7 seconds"));
    }

    #[tokio::test]
    async fn length_limit_uses_endpoint_error_shape() {
        let (status, body) = call(router(StatusCode::PAYLOAD_TOO_LARGE), "/api/predict").await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "REQUEST_TOO_LARGE");
    }

    #[tokio::test]
    async fn other_statuses_pass_through() {
        let app = router(StatusCode::BAD_REQUEST);
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"plain text");
    }
}
