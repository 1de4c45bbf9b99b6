use axum::response::{Html, IntoResponse};

/// 上传页面
pub async fn index_handler() -> impl IntoResponse {
    Html(include_str!("../../templates/index.html"))
}
