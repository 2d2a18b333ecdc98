//! 活动模型快照

use crate::inference::Detector;
use crate::models::LabelMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// 模型来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// 本地检查点目录
    Local,
    /// 模型仓库
    Registry,
}

/// 快照的来源信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub source: ModelSource,
    /// 仓库版本；本地来源为 None
    pub version: Option<u64>,
    /// 实际加载的检查点路径
    pub checkpoint: PathBuf,
    pub loaded_at: DateTime<Utc>,
}

/// 活动模型
///
/// 创建后不可变；切换时整体替换。
pub struct ActiveModel {
    pub detector: Arc<dyn Detector>,
    pub labels: LabelMap,
    pub target_classes: Vec<String>,
    pub provenance: Provenance,
}

impl ActiveModel {
    /// 检查点文件名
    pub fn checkpoint_name(&self) -> Option<String> {
        self.provenance
            .checkpoint
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// 当前已应用的仓库版本（仅当来源为仓库）
    pub fn registry_version(&self) -> Option<u64> {
        match self.provenance.source {
            ModelSource::Registry => self.provenance.version,
            ModelSource::Local => None,
        }
    }
}

/// 活动模型状态（对外展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveInfo {
    pub ready: bool,
    pub source: Option<ModelSource>,
    pub version: Option<u64>,
    pub checkpoint: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub classes: Vec<String>,
}

impl ActiveInfo {
    /// 尚未加载任何模型
    pub fn not_ready() -> Self {
        Self {
            ready: false,
            source: None,
            version: None,
            checkpoint: None,
            loaded_at: None,
            classes: Vec::new(),
        }
    }
}

impl From<&ActiveModel> for ActiveInfo {
    fn from(model: &ActiveModel) -> Self {
        Self {
            ready: true,
            source: Some(model.provenance.source),
            version: model.provenance.version,
            checkpoint: Some(model.provenance.checkpoint.display().to_string()),
            loaded_at: Some(model.provenance.loaded_at),
            classes: model.target_classes.clone(),
        }
    }
}
