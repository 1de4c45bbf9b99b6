use crate::utils::error::DigitError;
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// 类别数量（数字0-9）
pub const NUM_CLASSES: usize = 10;

/// 概率和允许的误差
pub const SUM_TOLERANCE: f32 = 0.01;

/// 10个类别上的概率分布
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probabilities([f32; NUM_CLASSES]);

impl Probabilities {
    /// 校验模型输出；不是概率分布时按logits做softmax
    pub fn from_model_output(raw: &[f32]) -> Result<Self> {
        if raw.len() != NUM_CLASSES {
            return Err(DigitError::Inference(format!(
                "Expected {} class scores, got {}",
                NUM_CLASSES,
                raw.len()
            )));
        }

        if raw.iter().any(|v| !v.is_finite()) {
            return Err(DigitError::Inference(
                "Model produced non-finite scores".to_string(),
            ));
        }

        let mut values = [0.0f32; NUM_CLASSES];
        values.copy_from_slice(raw);

        let sum: f32 = values.iter().sum();
        let is_distribution =
            values.iter().all(|v| (0.0..=1.0).contains(v)) && (sum - 1.0).abs() <= SUM_TOLERANCE;

        if !is_distribution {
            tracing::debug!("Model output is not a distribution (sum={:.4}), applying softmax", sum);
            values = softmax(&values);
        }

        Ok(Self(values))
    }

    pub fn values(&self) -> &[f32; NUM_CLASSES] {
        &self.0
    }

    pub fn sum(&self) -> f32 {
        self.0.iter().sum()
    }

    /// 最大概率的下标，并列时取第一个
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &p) in self.0.iter().enumerate().skip(1) {
            if p > self.0[best] {
                best = i;
            }
        }
        best
    }
}

fn softmax(logits: &[f32; NUM_CLASSES]) -> [f32; NUM_CLASSES] {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut out = [0.0f32; NUM_CLASSES];
    let mut total = 0.0;
    for (o, &l) in out.iter_mut().zip(logits) {
        *o = (l - max).exp();
        total += *o;
    }
    for o in out.iter_mut() {
        *o /= total;
    }
    out
}

/// 单张图像的分类结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub digit: u8,
    pub confidence: f32,
    pub probabilities: Probabilities,
}

impl Prediction {
    pub fn from_probabilities(probabilities: Probabilities) -> Self {
        let index = probabilities.argmax();
        Self {
            digit: index as u8,
            confidence: probabilities.values()[index],
            probabilities,
        }
    }
}

/// `/predict`响应
#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
    pub prediction: u8,
    pub confidence: f32,
    pub all_probabilities: BTreeMap<String, f32>,
    /// 是否对输入做了极性反转
    pub inverted: bool,
}

/// `/api/predict`响应（百分比）
#[derive(Debug, Clone, Serialize)]
pub struct PercentagePredictResponse {
    pub success: bool,
    pub prediction: u8,
    pub confidence: f32,
    pub probabilities: BTreeMap<String, f32>,
}

/// 结果格式化器
pub struct ResultFormatter;

impl ResultFormatter {
    pub fn standard(prediction: &Prediction, inverted: bool) -> PredictResponse {
        PredictResponse {
            prediction: prediction.digit,
            confidence: prediction.confidence,
            all_probabilities: Self::keyed(prediction, |p| p),
            inverted,
        }
    }

    pub fn percentage(prediction: &Prediction) -> PercentagePredictResponse {
        PercentagePredictResponse {
            success: true,
            prediction: prediction.digit,
            confidence: to_percent(prediction.confidence),
            probabilities: Self::keyed(prediction, to_percent),
        }
    }

    fn keyed(prediction: &Prediction, scale: impl Fn(f32) -> f32) -> BTreeMap<String, f32> {
        prediction
            .probabilities
            .values()
            .iter()
            .enumerate()
            .map(|(i, &p)| (i.to_string(), scale(p)))
            .collect()
    }
}

/// 转为百分比并保留两位小数
fn to_percent(p: f32) -> f32 {
    (p * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEAKED: [f32; 10] = [0.01, 0.01, 0.02, 0.8, 0.02, 0.03, 0.03, 0.04, 0.02, 0.02];

    #[test]
    fn keeps_valid_distribution() {
        let probs = Probabilities::from_model_output(&PEAKED).unwrap();
        assert_eq!(probs.values(), &PEAKED);
    }

    #[test]
    fn applies_softmax_to_logits() {
        let logits = [1.0, 2.0, -3.0, 0.5, 4.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let probs = Probabilities::from_model_output(&logits).unwrap();
        assert!((probs.sum() - 1.0).abs() < 1e-5);
        assert_eq!(probs.argmax(), 4);
        assert!(probs.values().iter().all(|v| *v > 0.0));
    }

    #[test]
    fn rejects_wrong_length_and_nan() {
        assert!(Probabilities::from_model_output(&[0.5, 0.5]).is_err());

        let mut scores = PEAKED;
        scores[2] = f32::NAN;
        assert!(matches!(
            Probabilities::from_model_output(&scores),
            Err(DigitError::Inference(_))
        ));
    }

    #[test]
    fn argmax_takes_first_of_ties() {
        let probs = Probabilities::from_model_output(&[0.1; 10]).unwrap();
        assert_eq!(probs.argmax(), 0);
    }

    #[test]
    fn prediction_matches_max_probability() {
        let prediction = Prediction::from_probabilities(Probabilities::from_model_output(&PEAKED).unwrap());
        assert_eq!(prediction.digit, 3);
        assert_eq!(prediction.confidence, 0.8);
    }

    #[test]
    fn standard_format_uses_string_keys() {
        let prediction = Prediction::from_probabilities(Probabilities::from_model_output(&PEAKED).unwrap());
        let response = ResultFormatter::standard(&prediction, true);

        assert_eq!(response.all_probabilities.len(), 10);
        assert_eq!(response.all_probabilities["3"], 0.8);
        assert!(response.inverted);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["prediction"], 3);
        assert!(json["all_probabilities"]["9"].is_number());
    }

    #[test]
    fn percentage_format_rounds_to_two_decimals() {
        let raw = [0.123456, 0.876544, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let prediction = Prediction::from_probabilities(Probabilities::from_model_output(&raw).unwrap());
        let response = ResultFormatter::percentage(&prediction);

        assert!(response.success);
        assert_eq!(response.prediction, 1);
        assert!((response.confidence - 87.65).abs() < 1e-3);
        assert!((response.probabilities["0"] - 12.35).abs() < 1e-3);
    }
}
