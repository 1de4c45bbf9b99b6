use crate::{
    image::{NormalizedTensor, Prediction, Probabilities, NUM_CLASSES},
    models::DigitModel,
    utils::error::DigitError,
    Result,
};
use mnist::MnistBuilder;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

const PIXELS_PER_IMAGE: usize = 28 * 28;

const TRAIN_SAMPLES: u32 = 60_000;
const TEST_SAMPLES: u32 = 10_000;

/// MNIST官方文件名及其字节数（图像头16字节，标签头8字节）
///
/// `mnist`加载器要求四个文件都在，且读到截断文件时会panic，所以先核对大小
const IDX_FILES: [(&str, u64); 4] = [
    ("train-images-idx3-ubyte", 16 + TRAIN_SAMPLES as u64 * PIXELS_PER_IMAGE as u64),
    ("train-labels-idx1-ubyte", 8 + TRAIN_SAMPLES as u64),
    ("t10k-images-idx3-ubyte", 16 + TEST_SAMPLES as u64 * PIXELS_PER_IMAGE as u64),
    ("t10k-labels-idx1-ubyte", 8 + TEST_SAMPLES as u64),
];

/// MNIST测试集（原始像素，黑底白字）
pub struct MnistTestSet {
    images: Vec<u8>,
    labels: Vec<u8>,
}

impl MnistTestSet {
    /// 从IDX文件目录加载测试集
    pub fn load(data_dir: &Path) -> Result<Self> {
        for (file, expected_len) in IDX_FILES {
            let path = data_dir.join(file);
            if !path.is_file() {
                return Err(DigitError::Dataset(format!(
                    "Missing MNIST file {} in {}",
                    file,
                    data_dir.display()
                )));
            }

            let actual_len = std::fs::metadata(&path)?.len();
            if actual_len != expected_len {
                return Err(DigitError::Dataset(format!(
                    "MNIST file {} has {} bytes, expected {}",
                    path.display(),
                    actual_len,
                    expected_len
                )));
            }
        }

        let base_path = format!("{}/", data_dir.display());
        tracing::info!("Loading MNIST test set from {}", data_dir.display());

        let mnist = MnistBuilder::new()
            .base_path(&base_path)
            .training_set_length(TRAIN_SAMPLES)
            .validation_set_length(0)
            .test_set_length(TEST_SAMPLES)
            .finalize();

        Self::from_parts(mnist.tst_img, mnist.tst_lbl)
    }

    pub fn from_parts(images: Vec<u8>, labels: Vec<u8>) -> Result<Self> {
        if images.len() != labels.len() * PIXELS_PER_IMAGE {
            return Err(DigitError::Dataset(format!(
                "{} image bytes do not match {} labels",
                images.len(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l as usize >= NUM_CLASSES) {
            return Err(DigitError::Dataset(format!("Label out of range: {}", bad)));
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn sample(&self, index: usize) -> (&[u8], u8) {
        let start = index * PIXELS_PER_IMAGE;
        (
            &self.images[start..start + PIXELS_PER_IMAGE],
            self.labels[index],
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvaluationOptions {
    /// 只评估前N张
    pub limit: Option<usize>,
    /// 报告中保留的错误样本数
    pub max_mistakes: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DigitAccuracy {
    pub digit: u8,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Mistake {
    pub index: usize,
    pub predicted: u8,
    pub actual: u8,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f32,
    pub per_digit: Vec<DigitAccuracy>,
    pub mistakes: Vec<Mistake>,
    pub elapsed_secs: f32,
}

pub struct Evaluator;

impl Evaluator {
    /// 与训练时相同的预处理：只除以255，不做反转
    pub fn run(
        model: &dyn DigitModel,
        dataset: &MnistTestSet,
        options: &EvaluationOptions,
    ) -> Result<EvaluationReport> {
        let start_time = Instant::now();
        let total = options
            .limit
            .map_or(dataset.len(), |limit| limit.min(dataset.len()));

        let mut per_digit: Vec<DigitAccuracy> = (0..NUM_CLASSES as u8)
            .map(|digit| DigitAccuracy {
                digit,
                ..Default::default()
            })
            .collect();
        let mut mistakes = Vec::new();
        let mut correct = 0;

        for index in 0..total {
            let (pixels, label) = dataset.sample(index);
            let tensor = NormalizedTensor::from_raw_pixels(pixels)?;
            let scores = model.predict(&tensor)?;
            let prediction = Prediction::from_probabilities(Probabilities::from_model_output(&scores)?);

            let stats = &mut per_digit[label as usize];
            stats.total += 1;
            if prediction.digit == label {
                stats.correct += 1;
                correct += 1;
            } else if mistakes.len() < options.max_mistakes {
                mistakes.push(Mistake {
                    index,
                    predicted: prediction.digit,
                    actual: label,
                    confidence: prediction.confidence,
                });
            }

            if (index + 1) % 1000 == 0 {
                tracing::debug!("Evaluated {}/{} samples", index + 1, total);
            }
        }

        for stats in per_digit.iter_mut() {
            stats.accuracy = ratio(stats.correct, stats.total);
        }

        let report = EvaluationReport {
            total,
            correct,
            accuracy: ratio(correct, total),
            per_digit,
            mistakes,
            elapsed_secs: start_time.elapsed().as_secs_f32(),
        };

        tracing::info!(
            "Evaluation finished: {}/{} correct ({:.2}%) in {:.2}s",
            report.correct,
            report.total,
            report.accuracy * 100.0,
            report.elapsed_secs
        );

        Ok(report)
    }
}

fn ratio(part: usize, whole: usize) -> f32 {
    if whole == 0 {
        0.0
    } else {
        part as f32 / whole as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 根据第一个像素的亮度预测：像素值/25
    struct FirstPixelModel;

    impl DigitModel for FirstPixelModel {
        fn predict(&self, input: &NormalizedTensor) -> Result<Vec<f32>> {
            let digit = ((input.pixels()[[0, 0]] * 255.0).round() as usize / 25).min(9);
            let mut scores = vec![0.0; 10];
            scores[digit] = 1.0;
            Ok(scores)
        }

        fn describe(&self) -> String {
            "first-pixel".into()
        }
    }

    fn dataset(samples: &[(u8, u8)]) -> MnistTestSet {
        let mut images = Vec::new();
        let mut labels = Vec::new();
        for &(first_pixel, label) in samples {
            let mut pixels = vec![0u8; PIXELS_PER_IMAGE];
            pixels[0] = first_pixel;
            images.extend(pixels);
            labels.push(label);
        }
        MnistTestSet::from_parts(images, labels).unwrap()
    }

    #[test]
    fn counts_correct_and_mistakes() {
        // 像素0->0, 50->2, 75->3
        let set = dataset(&[(0, 0), (50, 2), (75, 4), (0, 1)]);
        let options = EvaluationOptions {
            limit: None,
            max_mistakes: 1,
        };
        let report = Evaluator::run(&FirstPixelModel, &set, &options).unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.correct, 2);
        assert!((report.accuracy - 0.5).abs() < 1e-6);
        assert_eq!(report.mistakes.len(), 1);
        assert_eq!(report.mistakes[0].index, 2);
        assert_eq!(report.mistakes[0].predicted, 3);
        assert_eq!(report.mistakes[0].actual, 4);
        assert_eq!(report.per_digit[2].correct, 1);
        assert_eq!(report.per_digit[4].accuracy, 0.0);
    }

    #[test]
    fn respects_limit() {
        let set = dataset(&[(0, 0), (0, 0), (0, 5)]);
        let options = EvaluationOptions {
            limit: Some(2),
            max_mistakes: 10,
        };
        let report = Evaluator::run(&FirstPixelModel, &set, &options).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.accuracy, 1.0);
    }

    #[test]
    fn rejects_mismatched_parts() {
        assert!(MnistTestSet::from_parts(vec![0; 10], vec![1]).is_err());
        assert!(MnistTestSet::from_parts(vec![0; PIXELS_PER_IMAGE], vec![12]).is_err());
    }

    #[test]
    fn missing_files_are_reported() {
        let dir = std::env::temp_dir().join(format!("onnx-digits-mnist-{}", uuid::Uuid::new_v4()));
        let err = MnistTestSet::load(&dir).err().unwrap();
        assert!(matches!(err, DigitError::Dataset(_)));
    }

    #[test]
    fn truncated_files_are_reported_instead_of_panicking() {
        let dir = std::env::temp_dir().join(format!("onnx-digits-mnist-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for (file, _) in IDX_FILES {
            std::fs::write(dir.join(file), [0u8; 32]).unwrap();
        }

        let err = MnistTestSet::load(&dir).err().unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        match err {
            DigitError::Dataset(message) => {
                assert!(message.contains("train-images-idx3-ubyte"), "{}", message);
                assert!(message.contains("47040016"), "{}", message);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
