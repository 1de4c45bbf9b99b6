use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigitError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("No image provided: {0}")]
    MissingImage(String),

    #[error("No file selected")]
    EmptyFilename,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Request body too large, max allowed: {0} bytes")]
    RequestTooLarge(usize),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl DigitError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DigitError::MissingImage(_)
            | DigitError::EmptyFilename
            | DigitError::InvalidInput(_)
            | DigitError::Base64(_)
            | DigitError::ImageDecode(_)
            | DigitError::Json(_) => StatusCode::BAD_REQUEST,
            DigitError::FileTooLarge(_, _) | DigitError::RequestTooLarge(_) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            DigitError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            DigitError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            DigitError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            DigitError::Inference(_) => "INFERENCE_ERROR",
            DigitError::MissingImage(_) => "MISSING_IMAGE",
            DigitError::EmptyFilename => "EMPTY_FILENAME",
            DigitError::InvalidInput(_) => "INVALID_INPUT",
            DigitError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            DigitError::RequestTooLarge(_) => "REQUEST_TOO_LARGE",
            DigitError::Timeout(_) => "REQUEST_TIMEOUT",
            DigitError::Dataset(_) => "DATASET_ERROR",
            DigitError::Config(_) => "CONFIG_ERROR",
            DigitError::Io(_) => "IO_ERROR",
            DigitError::Json(_) => "JSON_ERROR",
            DigitError::Base64(_) => "BASE64_DECODE_ERROR",
            DigitError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            DigitError::Ort(_) => "ORT_ERROR",
            DigitError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 按接口选择错误格式：`/api/predict`带`success`字段
    pub fn into_response_for(self, path: &str) -> Response {
        if path == "/api/predict" {
            PercentageError(self).into_response()
        } else {
            self.into_response()
        }
    }

    fn log(&self, status: StatusCode) {
        if status.is_client_error() {
            tracing::warn!("Request rejected: {} ({})", self, status);
        } else {
            tracing::error!("Request failed: {} ({})", self, status);
        }
    }
}

impl IntoResponse for DigitError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        self.log(status);

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.error_code(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// `/api/predict` 使用的错误格式：`{success: false, error, code}`
#[derive(Debug)]
pub struct PercentageError(pub DigitError);

impl From<DigitError> for PercentageError {
    fn from(err: DigitError) -> Self {
        Self(err)
    }
}

impl IntoResponse for PercentageError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        self.0.log(status);

        let body = serde_json::json!({
            "success": false,
            "error": self.0.to_string(),
            "code": self.0.error_code(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        assert_eq!(
            DigitError::MissingImage("no field".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(DigitError::EmptyFilename.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            DigitError::InvalidInput("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn model_unavailable_is_server_error() {
        let err = DigitError::ModelUnavailable("not loaded".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "MODEL_UNAVAILABLE");
    }

    #[test]
    fn oversized_files_are_rejected_with_413() {
        let err = DigitError::FileTooLarge(100, 10);
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(err.to_string().contains("100"));

        let err = DigitError::RequestTooLarge(1024);
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.error_code(), "REQUEST_TOO_LARGE");
    }

    #[test]
    fn timeout_maps_to_408() {
        let err = DigitError::Timeout(60);
        assert_eq!(err.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(err.error_code(), "REQUEST_TIMEOUT");
    }
}
