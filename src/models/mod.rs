pub mod artifact;
pub mod classifier;
pub mod manager;

pub use artifact::{ArtifactStore, PublishedArtifact};
pub use classifier::{DigitModel, OnnxClassifier};
pub use manager::{ModelLoader, ModelManager, ModelStats, OnnxModelLoader};
