use crate::config::ServerConfig;
use crate::digits::{ImageSource, PredictJsonRequest};
use crate::image::loader::MAX_FILE_SIZE;
use crate::utils::error::DigitError;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Multipart, Request},
    http::{header::CONTENT_TYPE, request::Parts, StatusCode},
    Json,
};

/// 接受的multipart图像字段名
pub const IMAGE_FIELDS: [&str; 2] = ["image", "file"];

/// 根据Content-Type把请求解析为multipart上传或JSON base64
#[async_trait]
impl<S> FromRequest<S> for ImageSource
where
    S: Send + Sync,
{
    type Rejection = DigitError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase().starts_with("multipart/form-data"))
            .unwrap_or(false);

        let body_limit = req
            .extensions()
            .get::<ServerConfig>()
            .map_or(MAX_FILE_SIZE, |limits| limits.max_request_size);

        if is_multipart {
            let multipart = Multipart::from_request(req, state).await.map_err(|e| {
                body_error(e.status(), body_limit, format!("Invalid multipart body: {}", e))
            })?;
            read_multipart(multipart, body_limit).await
        } else {
            let Json(body) = Json::<PredictJsonRequest>::from_request(req, state)
                .await
                .map_err(|e| body_error(e.status(), body_limit, format!("JSON parse error: {}", e)))?;

            match body.image {
                Some(image) if !image.trim().is_empty() => Ok(ImageSource::DataUrl(image)),
                _ => Err(DigitError::MissingImage(
                    "expected JSON field 'image' with a base64 data URL".to_string(),
                )),
            }
        }
    }
}

/// 请求体超限时报告413，其余读取错误为400
fn body_error(status: StatusCode, body_limit: usize, message: String) -> DigitError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        DigitError::RequestTooLarge(body_limit)
    } else {
        DigitError::InvalidInput(message)
    }
}

/// 取第一个`image`/`file`字段，忽略其他字段
async fn read_multipart(mut multipart: Multipart, body_limit: usize) -> Result<ImageSource, DigitError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        body_error(e.status(), body_limit, format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        if !IMAGE_FIELDS.contains(&field_name.as_str()) {
            tracing::debug!("Ignoring unknown field: {}", field_name);
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        if matches!(filename.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(DigitError::EmptyFilename);
        }

        let bytes = field.bytes().await.map_err(|e| {
            body_error(e.status(), body_limit, format!("Failed to read file data: {}", e))
        })?;

        tracing::debug!("Received file field '{}': {} bytes", field_name, bytes.len());

        return Ok(ImageSource::Upload {
            field: field_name,
            filename,
            bytes,
        });
    }

    Err(DigitError::MissingImage(
        "expected multipart field 'image' or 'file'".to_string(),
    ))
}

/// 请求ID提取器
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub const HEADER: &'static str = "x-request-id";
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<RequestId>() {
            return Ok(id.clone());
        }

        let request_id = parts
            .headers
            .get(Self::HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(RequestId(request_id))
    }
}
