use crate::api::error::ConfigError;
use crate::config::defaults::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 主配置结构
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub registry: RegistryConfig,
    pub inference: InferenceConfig,
    pub retrain: RetrainConfig,
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 单个请求体上限（字节），覆盖 axum 默认的 2MB
    pub max_upload_bytes: usize,
}

/// 存储配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 本地检查点目录
    pub checkpoint_dir: PathBuf,
    /// 候选检查点文件名前缀
    pub checkpoint_prefix: String,
    /// 候选检查点扩展名（不含点）
    pub checkpoint_extension: String,
    /// 新样本目录（其下 images/ 与 labels/）
    pub samples_dir: PathBuf,
}

/// Registry 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// MLflow tracking server（REST）
    Mlflow,
    /// 本地 TOML 清单
    Manifest,
}

/// 模型仓库配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub enabled: bool,
    pub backend: RegistryBackend,
    pub tracking_uri: String,
    pub manifest_path: PathBuf,
    pub artifact_root: PathBuf,
    /// 注册模型名称
    pub model_name: String,
    /// 要跟随的阶段
    pub stage: String,
    pub timeout_secs: u64,
    /// 后台轮询间隔（秒），None 表示只在 /health 时同步
    pub poll_interval_secs: Option<u64>,
}

/// 推理配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// 检测后端名称
    pub backend: String,
    /// 默认置信度阈值
    pub score_threshold: f32,
}

/// 重训练任务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrainConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout_secs: u64,
    pub progress_log: PathBuf,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    /// 输出目标：`stdout`、`stderr` 或文件路径
    pub output: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            checkpoint_prefix: DEFAULT_CHECKPOINT_PREFIX.to_string(),
            checkpoint_extension: DEFAULT_CHECKPOINT_EXTENSION.to_string(),
            samples_dir: PathBuf::from(DEFAULT_SAMPLES_DIR),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: RegistryBackend::Mlflow,
            tracking_uri: DEFAULT_TRACKING_URI.to_string(),
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_PATH),
            artifact_root: PathBuf::from(DEFAULT_ARTIFACT_ROOT),
            model_name: DEFAULT_REGISTERED_MODEL.to_string(),
            stage: DEFAULT_STAGE.to_string(),
            timeout_secs: DEFAULT_REGISTRY_TIMEOUT_SECS,
            poll_interval_secs: None,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_RETRAIN_PROGRAM.to_string(),
            args: default_retrain_args(),
            working_dir: PathBuf::from("."),
            timeout_secs: DEFAULT_RETRAIN_TIMEOUT_SECS,
            progress_log: PathBuf::from(DEFAULT_PROGRESS_LOG),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: DEFAULT_LOG_FORMAT.to_string(),
            output: vec!["stdout".to_string(), DEFAULT_APP_LOG.to_string()],
        }
    }
}

impl LoggingConfig {
    /// 第一个文件输出，即 `/logs` 返回的应用日志
    pub fn log_file(&self) -> Option<&Path> {
        self.output
            .iter()
            .map(String::as_str)
            .find(|target| !matches!(*target, "stdout" | "stderr"))
            .map(Path::new)
    }
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &str) -> crate::Result<Self> {
        crate::config::loader::load_from_file(path)
    }

    /// 从环境变量加载配置
    pub fn from_env() -> crate::Result<Self> {
        crate::config::loader::load_from_env()
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.inference.score_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "inference.score_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("server.max_upload_bytes must be > 0".to_string()));
        }
        if self.registry.timeout_secs == 0 {
            return Err(ConfigError::Invalid("registry.timeout_secs must be > 0".to_string()));
        }
        if self.registry.poll_interval_secs == Some(0) {
            return Err(ConfigError::Invalid("registry.poll_interval_secs must be > 0".to_string()));
        }
        if self.retrain.timeout_secs == 0 {
            return Err(ConfigError::Invalid("retrain.timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.storage.checkpoint_prefix, "best_");
        assert_eq!(config.inference.score_threshold, 0.5);
        assert!(!config.registry.enabled);
        assert_eq!(config.registry.stage, "Production");
    }

    #[test]
    fn test_log_file_skips_console_outputs() {
        let logging = LoggingConfig {
            level: "info".to_string(),
            format: "json".to_string(),
            output: vec!["stderr".to_string(), "logs/a.log".to_string(), "logs/b.log".to_string()],
        };
        assert_eq!(logging.log_file(), Some(Path::new("logs/a.log")));

        let console_only = LoggingConfig {
            output: vec!["stdout".to_string()],
            ..logging
        };
        assert_eq!(console_only.log_file(), None);
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.inference.score_threshold = 7.0;
        assert!(config.validate().is_err());
        config.inference.score_threshold = f32::NAN;
        assert!(config.validate().is_err());
        config.inference.score_threshold = 1.0;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.registry.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retrain.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.max_upload_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.registry.poll_interval_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9100

            [registry]
            enabled = true
            backend = "manifest"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.registry.backend, RegistryBackend::Manifest);
        assert_eq!(config.registry.model_name, DEFAULT_REGISTERED_MODEL);
    }
}
