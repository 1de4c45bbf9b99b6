use crate::config::OnnxConfig;
use crate::image::{InputLayout, NormalizedTensor};
use crate::utils::error::DigitError;
use crate::Result;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 数字分类模型：输入归一化图像，输出10个类别的分数
pub trait DigitModel: Send + Sync {
    fn predict(&self, input: &NormalizedTensor) -> Result<Vec<f32>>;

    /// 模型描述，用于日志和状态接口
    fn describe(&self) -> String;
}

/// 基于ONNX Runtime的分类器
pub struct OnnxClassifier {
    session: Arc<Mutex<Session>>,
    input_name: String,  // 动态发现的输入名称
    output_name: String, // 动态发现的输出名称
    layout: InputLayout,
    path: PathBuf,
}

impl OnnxClassifier {
    pub fn new(model_path: &Path, onnx_config: &OnnxConfig, layout: InputLayout) -> Result<Self> {
        if !model_path.exists() {
            return Err(DigitError::ModelLoad(format!(
                "Model not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading digit model from: {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(optimization_level(onnx_config.optimization_level))?
            .with_intra_threads(onnx_config.intra_threads)?
            .commit_from_file(model_path)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| DigitError::ModelLoad("Model has no inputs".to_string()))?;

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| DigitError::ModelLoad("Model has no outputs".to_string()))?;

        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Model output[{}]: '{}'", i, output.name);
        }

        tracing::info!(
            "Digit model ready: input='{}', output='{}', layout={:?}",
            input_name,
            output_name,
            layout
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            output_name,
            layout,
            path: model_path.to_path_buf(),
        })
    }
}

impl DigitModel for OnnxClassifier {
    fn predict(&self, input: &NormalizedTensor) -> Result<Vec<f32>> {
        let input_tensor = Tensor::from_array(input.to_input(self.layout)?)?;

        let scores = {
            let mut session = self.session.lock();
            let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

            match outputs.get(self.output_name.as_str()) {
                Some(output) => output
                    .try_extract_array::<f32>()?
                    .iter()
                    .copied()
                    .collect::<Vec<f32>>(),
                None => {
                    let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                    return Err(DigitError::Inference(format!(
                        "Output '{}' not found. Available outputs: {:?}",
                        self.output_name, available
                    )));
                }
            }
        };

        Ok(scores)
    }

    fn describe(&self) -> String {
        format!("onnx:{} ({:?})", self.path.display(), self.layout)
    }
}

fn optimization_level(level: i32) -> GraphOptimizationLevel {
    match level {
        i32::MIN..=0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}
