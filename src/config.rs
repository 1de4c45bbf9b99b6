use crate::image::InputLayout;
use anyhow::Result;
use std::path::PathBuf;

/// 默认模型文件名
pub const DEFAULT_MODEL_FILE: &str = "mnist_model.onnx";

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 模型文件名（相对于模型目录）
    pub model_file: String,

    /// 模型期望的输入布局
    pub input_layout: InputLayout,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

impl OnnxConfig {
    pub fn detect() -> Self {
        let cpu_cores = num_cpus::get();
        Self {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
        }
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: impl Into<PathBuf>,
        model_file: String,
        input_layout: InputLayout,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        if model_file.trim().is_empty() {
            anyhow::bail!("model file name must not be empty");
        }

        let workers = workers.unwrap_or_else(num_cpus::get).max(1);

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 }, // 开发模式更长超时
            max_request_size: 50 * 1024 * 1024, // 50MB
        };

        Ok(Self {
            bind_addr,
            models_dir: models_dir.into(),
            model_file,
            input_layout,
            workers,
            dev_mode,
            onnx_config: OnnxConfig::detect(),
            server_config,
        })
    }

    /// 获取模型文件路径
    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(&self.model_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_path_joins_dir_and_file() {
        let config = Config::new(
            "127.0.0.1:0".into(),
            "models",
            DEFAULT_MODEL_FILE.into(),
            InputLayout::Flat,
            Some(2),
            false,
        )
        .unwrap();

        assert_eq!(config.model_path(), PathBuf::from("models").join("mnist_model.onnx"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.server_config.request_timeout, 60);
    }

    #[test]
    fn dev_mode_extends_timeout() {
        let config = Config::new(
            "127.0.0.1:0".into(),
            "models",
            DEFAULT_MODEL_FILE.into(),
            InputLayout::Nhwc,
            None,
            true,
        )
        .unwrap();

        assert_eq!(config.server_config.request_timeout, 300);
        assert!(config.workers >= 1);
        assert!(config.onnx_config.intra_threads >= 1);
    }

    #[test]
    fn empty_model_file_is_rejected() {
        let result = Config::new(
            "127.0.0.1:0".into(),
            "models",
            "  ".into(),
            InputLayout::Flat,
            None,
            false,
        );
        assert!(result.is_err());
    }
}
