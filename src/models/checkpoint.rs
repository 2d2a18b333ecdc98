//! 检查点格式定义
//!
//! 检查点是训练任务写出的不可变文件，包含模型权重、训练时使用的目标类别列表，
//! 以及内部标签 id 到类别名称的映射。后两者均为可选字段，缺失时使用文档约定的默认值。

use crate::api::error::CheckpointError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// 默认目标类别（检查点未记录 `target_classes` 时使用）
pub const DEFAULT_TARGET_CLASSES: [&str; 3] = ["person", "car", "airplane"];

/// 权重张量（扁平化存储）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// 形状
    pub shape: Vec<usize>,
    /// 数据（行优先）
    pub data: Vec<f32>,
}

impl Tensor {
    /// 创建张量
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    /// 全零张量
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    /// 形状声明的元素个数
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// 权重字典：参数名 -> 张量
pub type StateDict = BTreeMap<String, Tensor>;

/// 检查点文件的序列化结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointFile {
    /// 模型权重
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_state_dict: Option<StateDict>,

    /// 训练使用的目标类别（有序）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_classes: Option<Vec<String>>,

    /// 内部标签 id -> 类别名称；JSON 中键为字符串
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_to_name: Option<HashMap<String, String>>,
}

impl CheckpointFile {
    /// 校验并展开为已加载检查点
    pub fn into_loaded(self, path: &Path) -> Result<LoadedCheckpoint, CheckpointError> {
        let weights = self
            .model_state_dict
            .ok_or_else(|| CheckpointError::load(path, "missing model_state_dict"))?;

        for (name, tensor) in &weights {
            if tensor.numel() != tensor.data.len() {
                return Err(CheckpointError::load(
                    path,
                    format!(
                        "tensor {} declares shape {:?} but holds {} values",
                        name,
                        tensor.shape,
                        tensor.data.len()
                    ),
                ));
            }
        }

        let target_classes = self.target_classes.unwrap_or_else(|| {
            DEFAULT_TARGET_CLASSES
                .iter()
                .map(|s| s.to_string())
                .collect()
        });

        let labels = match self.internal_to_name {
            Some(raw) => LabelMap::from_raw(raw).map_err(|reason| CheckpointError::load(path, reason))?,
            None => LabelMap::sequential(&target_classes),
        };

        Ok(LoadedCheckpoint {
            path: path.to_path_buf(),
            num_classes: target_classes.len() + 1,
            target_classes,
            labels,
            weights,
        })
    }
}

/// 内部标签 id -> 类别名称
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelMap(BTreeMap<i64, String>);

impl LabelMap {
    /// 默认映射：1..K 依次对应目标类别（0 保留给背景）
    pub fn sequential(classes: &[String]) -> Self {
        Self(
            classes
                .iter()
                .enumerate()
                .map(|(i, name)| (i as i64 + 1, name.clone()))
                .collect(),
        )
    }

    /// 从原始映射构建，键统一转换为整数
    pub fn from_raw(raw: HashMap<String, String>) -> Result<Self, String> {
        raw.into_iter()
            .map(|(key, name)| {
                key.trim()
                    .parse::<i64>()
                    .map(|id| (id, name))
                    .map_err(|_| format!("internal_to_name key {:?} is not an integer", key))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Self)
    }

    /// 查找类别名称
    pub fn get(&self, id: i64) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    /// 解析类别名称，未映射的 id 渲染为 `class_<id>`
    pub fn resolve(&self, id: i64) -> String {
        self.get(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("class_{}", id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(i64, String)> for LabelMap {
    fn from_iter<I: IntoIterator<Item = (i64, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 已加载并校验过的检查点
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    /// 文件路径
    pub path: PathBuf,
    /// 目标类别
    pub target_classes: Vec<String>,
    /// 含背景的类别数
    pub num_classes: usize,
    /// 标签映射
    pub labels: LabelMap,
    /// 权重
    pub weights: StateDict,
}
