use crate::config::DEFAULT_MODEL_FILE;
use crate::utils::error::DigitError;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// 发布结果
#[derive(Debug, Clone, Serialize)]
pub struct PublishedArtifact {
    /// 带时间戳的归档副本
    pub archived: PathBuf,
    /// 服务默认加载的规范路径
    pub canonical: PathBuf,
    pub bytes: u64,
}

/// 把新导出的模型发布到模型目录
pub struct ArtifactStore {
    models_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.models_dir.join(DEFAULT_MODEL_FILE)
    }

    pub fn publish(&self, source: &Path) -> Result<PublishedArtifact> {
        self.publish_at(source, Utc::now())
    }

    /// 写入`mnist_model_<时间戳>.onnx`，再原子替换`mnist_model.onnx`
    pub fn publish_at(&self, source: &Path, now: DateTime<Utc>) -> Result<PublishedArtifact> {
        if !source.is_file() {
            return Err(DigitError::ModelLoad(format!(
                "Artifact not found: {}",
                source.display()
            )));
        }

        fs::create_dir_all(&self.models_dir)?;

        let stem = Path::new(DEFAULT_MODEL_FILE)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("mnist_model");
        let archived = self
            .models_dir
            .join(format!("{}_{}.onnx", stem, now.format("%Y%m%d_%H%M%S")));
        let bytes = fs::copy(source, &archived)?;

        // 先写临时文件再重命名，并发的reload不会读到半个文件
        let canonical = self.canonical_path();
        let staging = self
            .models_dir
            .join(format!(".{}.{}.tmp", DEFAULT_MODEL_FILE, uuid::Uuid::new_v4()));
        fs::copy(&archived, &staging)?;
        if let Err(e) = fs::rename(&staging, &canonical) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }

        tracing::info!(
            "Published artifact {} -> {} (archived as {}, {} bytes)",
            source.display(),
            canonical.display(),
            archived.display(),
            bytes
        );

        Ok(PublishedArtifact {
            archived,
            canonical,
            bytes,
        })
    }
}
