use crate::{
    digits::{ImageSource, Recognition},
    image::{ImageLoader, ImagePreprocessor, Prediction, Probabilities},
    models::{DigitModel, ModelManager},
    utils::error::DigitError,
    Result,
};
use std::time::Instant;

/// 识别流水线：解码 -> 归一化 -> 推理 -> 格式化
pub struct DigitPipeline;

impl DigitPipeline {
    /// 在阻塞线程池上执行识别
    pub async fn recognize(models: &ModelManager, source: ImageSource) -> Result<Recognition> {
        let model = models.current();
        let source_desc = models.source();

        tokio::task::spawn_blocking(move || {
            Self::recognize_blocking(model.as_deref(), &source_desc, &source)
        })
        .await
        .map_err(|e| DigitError::Internal(format!("Recognition task failed: {}", e)))?
    }

    /// 同步识别；输入错误先于模型可用性检查报告
    pub fn recognize_blocking(
        model: Option<&dyn DigitModel>,
        model_source: &str,
        source: &ImageSource,
    ) -> Result<Recognition> {
        let start_time = Instant::now();

        let image = ImageLoader::load(source)?;
        let tensor = ImagePreprocessor::normalize(&image)?;

        let model = model.ok_or_else(|| {
            DigitError::ModelUnavailable(format!("no model loaded from {}", model_source))
        })?;

        let scores = model.predict(&tensor)?;
        let probabilities = Probabilities::from_model_output(&scores)?;
        let prediction = Prediction::from_probabilities(probabilities);

        Ok(Recognition {
            prediction,
            inverted: tensor.inverted(),
            source_mean: tensor.source_mean(),
            elapsed: start_time.elapsed(),
        })
    }
}
