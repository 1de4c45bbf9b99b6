pub mod evaluation;
pub mod pipeline;
pub mod types;

pub use evaluation::{EvaluationOptions, EvaluationReport, Evaluator, MnistTestSet};
pub use pipeline::DigitPipeline;
pub use types::{ImageSource, PredictJsonRequest, Recognition};
