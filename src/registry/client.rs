//! 模型仓库客户端接口

use crate::config::{RegistryBackend, RegistryConfig};
use crate::registry::manifest::ManifestRegistry;
use crate::registry::mlflow::MlflowClient;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 仓库中的一个模型版本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// 版本号（单调递增且唯一）
    pub version: u64,
    /// 阶段，例如 `Production`、`Staging`、`None`
    pub stage: String,
    /// 工件来源描述，例如 `runs:/<run-id>/<path>` 或 `file:///...`
    pub source: String,
    #[serde(default)]
    pub run_id: Option<String>,
}

/// 仓库客户端
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// 仓库地址（仅用于展示）
    fn tracking_uri(&self) -> String;

    /// 列出某个注册模型的全部版本
    async fn search_model_versions(&self, model_name: &str) -> Result<Vec<ModelVersion>>;

    /// 下载运行（run）下的工件到 `dst_dir`
    ///
    /// 返回下载结果的路径；当工件是目录时返回目录路径，由调用方在其中定位文件。
    async fn download_artifact(&self, run_id: &str, path: &str, dst_dir: &Path) -> Result<PathBuf>;
}

/// 根据配置创建客户端
pub fn from_config(config: &RegistryConfig) -> Result<Arc<dyn RegistryClient>> {
    match config.backend {
        RegistryBackend::Mlflow => Ok(Arc::new(MlflowClient::new(
            &config.tracking_uri,
            config.timeout(),
        )?)),
        RegistryBackend::Manifest => Ok(Arc::new(ManifestRegistry::new(
            &config.manifest_path,
            &config.artifact_root,
        ))),
    }
}
