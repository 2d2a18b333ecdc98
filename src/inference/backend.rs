//! 检测后端抽象
//!
//! 神经网络本身对服务是不透明的：后端负责把已加载的检查点构建成一个
//! [`Detector`]（评分函数），检测器只做纯计算，不持有可变状态。
//! 阈值过滤、标签映射与排序由调用方（见 [`crate::inference::postprocess`]）完成。

use crate::api::error::InferenceError;
use crate::models::LoadedCheckpoint;
use crate::Result;
use image::RgbImage;
use std::collections::HashMap;
use std::sync::Arc;

/// 检测器原始输出（三个等长列表）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetections {
    /// 边界框 `[x1, y1, x2, y2]`
    pub boxes: Vec<[f32; 4]>,
    /// 置信度
    pub scores: Vec<f32>,
    /// 内部整数标签
    pub labels: Vec<i64>,
}

impl RawDetections {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// 追加一个检测
    pub fn push(&mut self, bbox: [f32; 4], score: f32, label: i64) {
        self.boxes.push(bbox);
        self.scores.push(score);
        self.labels.push(label);
    }
}

/// 评分函数
///
/// 对同一检测器的并发调用必须安全：实现只读访问权重。
pub trait Detector: Send + Sync {
    /// 对解码后的 RGB 图像运行检测
    fn run(&self, image: &RgbImage) -> Result<RawDetections>;
}

/// 检测后端
///
/// `load` 在旁路完整构建评分函数并校验权重形状，失败时返回
/// [`crate::api::error::CheckpointError::Load`]，不会影响正在服务的模型。
pub trait DetectionBackend: Send + Sync {
    /// 后端名称
    fn name(&self) -> &str;

    /// 由检查点构建检测器
    fn load(&self, checkpoint: &LoadedCheckpoint) -> Result<Arc<dyn Detector>>;
}

/// 后端注册表
///
/// 按名称查找检测后端，配置项 `inference.backend` 决定使用哪一个。
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn DetectionBackend>>,
}

impl BackendRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 包含内置后端的注册表
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::inference::backends::RegionHeadBackend::new()));
        registry
    }

    /// 注册后端
    pub fn register(&mut self, backend: Arc<dyn DetectionBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    /// 按名称获取后端
    pub fn get(&self, name: &str) -> Result<Arc<dyn DetectionBackend>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| InferenceError::UnsupportedBackend(name.to_string()).into())
    }

    /// 已注册的后端名称
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}
