use crate::digits::ImageSource;
use crate::utils::error::DigitError;
use crate::Result;
use base64::Engine;
use image::{DynamicImage, GenericImageView};

/// 单个图像文件的最大字节数
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024; // 50MB

/// 解码后图像的最大边长
pub const MAX_DIMENSION: u32 = 8192;

pub struct ImageLoader;

impl ImageLoader {
    /// 按输入来源加载图像
    pub fn load(source: &ImageSource) -> Result<DynamicImage> {
        match source {
            ImageSource::Upload { filename, bytes, .. } => {
                if matches!(filename.as_deref(), Some(name) if name.trim().is_empty()) {
                    return Err(DigitError::EmptyFilename);
                }
                Self::from_bytes(bytes)
            }
            ImageSource::DataUrl(data) => Self::from_base64(data),
        }
    }

    /// 从base64字符串或数据URL加载图像
    pub fn from_base64(data: &str) -> Result<DynamicImage> {
        let payload = Self::strip_data_url(data)?;
        let cleaned: String = payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();

        if cleaned.is_empty() {
            return Err(DigitError::InvalidInput("Empty base64 payload".to_string()));
        }

        let image_bytes = base64::engine::general_purpose::STANDARD.decode(cleaned.as_bytes())?;

        Self::from_bytes(&image_bytes)
    }

    /// 从字节加载图像
    pub fn from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(DigitError::InvalidInput("Empty file".to_string()));
        }

        if bytes.len() > MAX_FILE_SIZE {
            return Err(DigitError::FileTooLarge(bytes.len(), MAX_FILE_SIZE));
        }

        let image = image::load_from_memory(bytes)?;
        Self::validate_dimensions(&image)?;

        Ok(image)
    }

    /// 移除数据URL前缀 (data:image/xxx;base64,)
    fn strip_data_url(data: &str) -> Result<&str> {
        let data = data.trim();
        let Some(rest) = data.strip_prefix("data:") else {
            return Ok(data);
        };

        let (header, payload) = rest.split_once(',').ok_or_else(|| {
            DigitError::InvalidInput("Data URL is missing the ',' separator".to_string())
        })?;

        if !header.ends_with(";base64") {
            return Err(DigitError::InvalidInput(format!(
                "Data URL must be base64 encoded, got header 'data:{}'",
                header
            )));
        }

        Ok(payload)
    }

    /// 验证图像尺寸
    pub fn validate_dimensions(image: &DynamicImage) -> Result<()> {
        let (width, height) = image.dimensions();

        if width == 0 || height == 0 {
            return Err(DigitError::InvalidInput(format!(
                "Image has no pixels: {}x{}",
                width, height
            )));
        }

        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(DigitError::InvalidInput(format!(
                "Image too large: {}x{}, maximum {}x{}",
                width, height, MAX_DIMENSION, MAX_DIMENSION
            )));
        }

        Ok(())
    }
}
