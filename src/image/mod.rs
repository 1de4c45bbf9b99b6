pub mod loader;
pub mod preprocessing;
pub mod postprocessing;

pub use loader::ImageLoader;
pub use preprocessing::{ImagePreprocessor, InputLayout, NormalizedTensor};
pub use postprocessing::{Prediction, Probabilities, ResultFormatter, NUM_CLASSES};
