use crate::image::Prediction;
use axum::body::Bytes;
use serde::Deserialize;
use std::time::Duration;

/// 请求中的图像来源，在请求边界解析一次
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// multipart上传（字段`image`或`file`）
    Upload {
        field: String,
        filename: Option<String>,
        bytes: Bytes,
    },
    /// JSON中的base64数据URL
    DataUrl(String),
}

impl ImageSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ImageSource::Upload { .. } => "multipart",
            ImageSource::DataUrl(_) => "base64",
        }
    }

    /// 日志用的简短描述
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Upload {
                field,
                filename,
                bytes,
            } => format!(
                "{} field={} filename={} size={}",
                self.kind(),
                field,
                filename.as_deref().unwrap_or("-"),
                bytes.len()
            ),
            ImageSource::DataUrl(data) => format!("{} length={}", self.kind(), data.len()),
        }
    }
}

/// JSON请求体（base64模式）
#[derive(Debug, Deserialize)]
pub struct PredictJsonRequest {
    /// `data:image/<fmt>;base64,<payload>`或裸base64
    #[serde(default)]
    pub image: Option<String>,
}

/// 一次识别的完整结果
#[derive(Debug, Clone)]
pub struct Recognition {
    pub prediction: Prediction,
    /// 是否做了极性反转
    pub inverted: bool,
    /// 反转前的平均亮度
    pub source_mean: f32,
    pub elapsed: Duration,
}
