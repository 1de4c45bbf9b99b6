use crate::utils::error::DigitError;
use crate::Result;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array2, ArrayD, IxDyn};

/// MNIST图像边长
pub const IMAGE_SIDE: usize = 28;

/// 平均亮度超过该值时视为浅色背景并反转
pub const INVERT_THRESHOLD: f32 = 0.5;

/// 模型输入张量布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, 28, 28]`，Flatten输入的全连接网络
    #[default]
    Flat,
    /// `[1, 28, 28, 1]`，通道在后的卷积网络
    Nhwc,
    /// `[1, 1, 28, 28]`，通道在前的卷积网络
    Nchw,
}

impl InputLayout {
    pub fn shape(self) -> Vec<usize> {
        match self {
            InputLayout::Flat => vec![1, IMAGE_SIDE, IMAGE_SIDE],
            InputLayout::Nhwc => vec![1, IMAGE_SIDE, IMAGE_SIDE, 1],
            InputLayout::Nchw => vec![1, 1, IMAGE_SIDE, IMAGE_SIDE],
        }
    }
}

/// 归一化后的28x28单通道图像，取值范围[0, 1]，背景接近0
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    pixels: Array2<f32>,
    inverted: bool,
    source_mean: f32,
}

impl NormalizedTensor {
    /// 直接从训练集格式的像素（已是暗背景）构建，不做反转
    pub fn from_raw_pixels(raw: &[u8]) -> Result<Self> {
        if raw.len() != IMAGE_SIDE * IMAGE_SIDE {
            return Err(DigitError::InvalidInput(format!(
                "Expected {} pixels, got {}",
                IMAGE_SIDE * IMAGE_SIDE,
                raw.len()
            )));
        }

        let values: Vec<f32> = raw.iter().map(|&p| p as f32 / 255.0).collect();
        let pixels = Array2::from_shape_vec((IMAGE_SIDE, IMAGE_SIDE), values)
            .map_err(|e| DigitError::Internal(format!("Failed to shape pixels: {}", e)))?;
        let source_mean = pixels.mean().unwrap_or(0.0);

        Ok(Self {
            pixels,
            inverted: false,
            source_mean,
        })
    }

    pub fn pixels(&self) -> &Array2<f32> {
        &self.pixels
    }

    /// 是否应用了极性反转
    pub fn inverted(&self) -> bool {
        self.inverted
    }

    /// 反转前的平均亮度
    pub fn source_mean(&self) -> f32 {
        self.source_mean
    }

    pub fn mean(&self) -> f32 {
        self.pixels.mean().unwrap_or(0.0)
    }

    /// 按模型布局生成带batch维度的输入
    pub fn to_input(&self, layout: InputLayout) -> Result<ArrayD<f32>> {
        let data: Vec<f32> = self.pixels.iter().copied().collect();
        // 三种布局的元素顺序相同，只是形状不同
        ArrayD::from_shape_vec(IxDyn(&layout.shape()), data).map_err(|e| {
            DigitError::Internal(format!("Failed to build {:?} input: {}", layout, e))
        })
    }
}

pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// 灰度化 -> 缩放到28x28 -> 归一化 -> 极性检测与反转
    pub fn normalize(image: &DynamicImage) -> Result<NormalizedTensor> {
        let gray = image.to_luma8();
        let resized = image::imageops::resize(
            &gray,
            IMAGE_SIDE as u32,
            IMAGE_SIDE as u32,
            FilterType::Lanczos3,
        );

        let values: Vec<f32> = resized.pixels().map(|p| p.0[0] as f32 / 255.0).collect();
        let mut pixels = Array2::from_shape_vec((IMAGE_SIDE, IMAGE_SIDE), values)
            .map_err(|e| DigitError::Internal(format!("Failed to shape resized image: {}", e)))?;

        let source_mean = pixels.mean().unwrap_or(0.0);
        // 启发式：MNIST是黑底白字，而用户上传多为白底黑字
        let inverted = source_mean > INVERT_THRESHOLD;
        if inverted {
            pixels.mapv_inplace(|v| 1.0 - v);
        }

        tracing::debug!(
            "Normalized image: source={}x{}, mean={:.4}, inverted={}",
            image.width(),
            image.height(),
            source_mean,
            inverted
        );

        Ok(NormalizedTensor {
            pixels,
            inverted,
            source_mean,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn uniform(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value])))
    }

    #[test]
    fn black_image_is_not_inverted() {
        let tensor = ImagePreprocessor::normalize(&uniform(28, 28, 0)).unwrap();
        assert!(!tensor.inverted());
        assert!(tensor.mean() < 1e-6);
        assert_eq!(tensor.pixels().dim(), (28, 28));
    }

    #[test]
    fn white_image_is_inverted_to_dark_background() {
        let tensor = ImagePreprocessor::normalize(&uniform(28, 28, 255)).unwrap();
        assert!(tensor.inverted());
        assert!(tensor.source_mean() > 0.99);
        assert!(tensor.mean() < 0.01);
    }

    #[test]
    fn midpoint_gray_is_left_alone() {
        // 127/255 < 0.5，不触发反转
        let tensor = ImagePreprocessor::normalize(&uniform(28, 28, 127)).unwrap();
        assert!(!tensor.inverted());
        assert!((tensor.mean() - 127.0 / 255.0).abs() < 0.01);
    }

    #[test]
    fn large_color_image_is_resized_and_bounded() {
        let mut img = RgbImage::from_pixel(300, 200, Rgb([250, 250, 250]));
        for x in 90..210 {
            for y in 30..170 {
                img.put_pixel(x, y, Rgb([10, 10, 10]));
            }
        }
        let tensor = ImagePreprocessor::normalize(&DynamicImage::ImageRgb8(img)).unwrap();

        assert_eq!(tensor.pixels().dim(), (28, 28));
        assert!(tensor.inverted());
        assert!(tensor.pixels().iter().all(|v| (0.0..=1.0).contains(v)));
        // 中心的笔画反转后应为亮色
        assert!(tensor.pixels()[[14, 14]] > 0.8);
        assert!(tensor.pixels()[[0, 0]] < 0.2);
    }

    #[test]
    fn alpha_channel_is_ignored() {
        let img = RgbaImage::from_pixel(28, 28, Rgba([0, 0, 0, 0]));
        let tensor = ImagePreprocessor::normalize(&DynamicImage::ImageRgba8(img)).unwrap();
        assert!(!tensor.inverted());
    }

    #[test]
    fn layouts_keep_row_major_order() {
        let mut raw = vec![0u8; 28 * 28];
        raw[28 + 2] = 255; // 第1行第2列
        let tensor = NormalizedTensor::from_raw_pixels(&raw).unwrap();

        let flat = tensor.to_input(InputLayout::Flat).unwrap();
        assert_eq!(flat.shape(), &[1, 28, 28]);
        assert_eq!(flat[[0, 1, 2]], 1.0);

        let nhwc = tensor.to_input(InputLayout::Nhwc).unwrap();
        assert_eq!(nhwc.shape(), &[1, 28, 28, 1]);
        assert_eq!(nhwc[[0, 1, 2, 0]], 1.0);

        let nchw = tensor.to_input(InputLayout::Nchw).unwrap();
        assert_eq!(nchw.shape(), &[1, 1, 28, 28]);
        assert_eq!(nchw[[0, 0, 1, 2]], 1.0);
    }

    #[test]
    fn degenerate_sizes_still_produce_full_grid() {
        for (width, height) in [(1, 1), (1, 500), (500, 1), (29, 27)] {
            let tensor = ImagePreprocessor::normalize(&uniform(width, height, 200))
                .expect("any decodable size should normalize");
            assert_eq!(tensor.pixels().dim(), (IMAGE_SIDE, IMAGE_SIDE));
            for layout in [InputLayout::Flat, InputLayout::Nhwc, InputLayout::Nchw] {
                let input = tensor.to_input(layout).expect("layout shape must fit the grid");
                assert_eq!(input.shape(), layout.shape().as_slice());
                assert_eq!(input.len(), IMAGE_SIDE * IMAGE_SIDE);
            }
        }
    }

    #[test]
    fn raw_pixels_must_be_28_by_28() {
        assert!(NormalizedTensor::from_raw_pixels(&[0u8; 10]).is_err());
    }
}
