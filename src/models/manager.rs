use crate::config::Config;
use crate::image::InputLayout;
use crate::models::{DigitModel, OnnxClassifier};
use crate::utils::error::DigitError;
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 模型来源：负责从存储中构建一个新的模型实例
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn DigitModel>>;

    fn source(&self) -> String;
}

/// 从磁盘加载ONNX模型
pub struct OnnxModelLoader {
    config: Config,
}

impl OnnxModelLoader {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<Arc<dyn DigitModel>> {
        let classifier = OnnxClassifier::new(
            &self.config.model_path(),
            &self.config.onnx_config,
            self.config.input_layout,
        )?;
        Ok(Arc::new(classifier))
    }

    fn source(&self) -> String {
        self.config.model_path().display().to_string()
    }
}

#[derive(Clone)]
struct LoadedModel {
    model: Arc<dyn DigitModel>,
    loaded_at: DateTime<Utc>,
}

/// 模型管理器：持有当前模型句柄，支持原子替换
pub struct ModelManager {
    loader: Arc<dyn ModelLoader>,
    active: RwLock<Option<LoadedModel>>,
    reloads: AtomicU64,
    input_layout: InputLayout,
}

impl ModelManager {
    /// 创建管理器并尝试加载模型；失败只记录日志，服务照常启动
    pub fn initialize(loader: Arc<dyn ModelLoader>, input_layout: InputLayout) -> Self {
        tracing::info!("Initializing model manager...");

        let manager = Self {
            loader,
            active: RwLock::new(None),
            reloads: AtomicU64::new(0),
            input_layout,
        };

        match manager.loader.load() {
            Ok(model) => {
                tracing::info!("Model loaded: {}", model.describe());
                *manager.active.write() = Some(LoadedModel {
                    model,
                    loaded_at: Utc::now(),
                });
            }
            Err(e) => {
                tracing::error!(
                    "Failed to load model from {}: {}. Predictions are unavailable until a reload succeeds",
                    manager.loader.source(),
                    e
                );
            }
        }

        manager
    }

    /// 当前模型快照；进行中的请求持有自己的引用
    pub fn current(&self) -> Option<Arc<dyn DigitModel>> {
        self.active.read().as_ref().map(|loaded| Arc::clone(&loaded.model))
    }

    pub fn require(&self) -> Result<Arc<dyn DigitModel>> {
        self.current().ok_or_else(|| {
            DigitError::ModelUnavailable(format!(
                "no model loaded from {}",
                self.loader.source()
            ))
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.active.read().is_some()
    }

    /// 重新加载模型；失败时保留旧模型
    pub fn reload(&self) -> Result<()> {
        tracing::info!("Reloading model from {}", self.loader.source());

        let model = self.loader.load().map_err(|e| {
            tracing::error!("Model reload failed, keeping previous model: {}", e);
            e
        })?;

        let description = model.describe();
        *self.active.write() = Some(LoadedModel {
            model,
            loaded_at: Utc::now(),
        });
        self.reloads.fetch_add(1, Ordering::Relaxed);

        tracing::info!("Model reloaded: {}", description);
        Ok(())
    }

    pub fn source(&self) -> String {
        self.loader.source()
    }

    /// 获取模型统计信息
    pub fn stats(&self) -> ModelStats {
        let active = self.active.read();
        ModelStats {
            model_loaded: active.is_some(),
            source: self.loader.source(),
            model: active.as_ref().map(|loaded| loaded.model.describe()),
            loaded_at: active.as_ref().map(|loaded| loaded.loaded_at),
            reload_count: self.reloads.load(Ordering::Relaxed),
            input_layout: self.input_layout,
        }
    }
}

/// 模型统计信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStats {
    pub model_loaded: bool,
    pub source: String,
    pub model: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub reload_count: u64,
    pub input_layout: InputLayout,
}
