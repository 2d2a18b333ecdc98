use crate::config::Config;
use crate::core::ModelManager;
use crate::retrain::RetrainRunner;
use crate::storage::SampleStore;
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub manager: Arc<ModelManager>,
    pub samples: Arc<SampleStore>,
    pub retrain: Arc<RetrainRunner>,
    /// `/logs` 返回的应用日志
    pub app_log: Option<PathBuf>,
}

impl AppState {
    /// 按配置构建（不加载模型）
    pub fn new(config: Config) -> Result<Self> {
        let manager = ModelManager::from_config(&config)?;
        Ok(Self::with_manager(config, Arc::new(manager)))
    }

    /// 使用已有的管理器构建
    pub fn with_manager(config: Config, manager: Arc<ModelManager>) -> Self {
        Self {
            samples: Arc::new(SampleStore::from_config(&config)),
            retrain: Arc::new(RetrainRunner::new(config.retrain.clone())),
            app_log: config.logging.log_file().map(PathBuf::from),
            manager,
            config: Arc::new(config),
        }
    }
}
