//! 检测后处理：阈值过滤、标签映射、排序与截断

use crate::inference::backend::RawDetections;
use crate::models::{Detection, LabelMap};

/// 每次预测最多返回的检测数
pub const MAX_DETECTIONS: usize = 3;

/// 后处理原始检测结果
///
/// 丢弃置信度严格低于 `score_threshold` 的检测；标签经映射表转换为名称，
/// 未映射的 id 渲染为 `class_<id>`；按置信度降序排列后保留前 [`MAX_DETECTIONS`] 个。
pub fn postprocess(raw: RawDetections, labels: &LabelMap, score_threshold: f32) -> Vec<Detection> {
    let mut detections: Vec<Detection> = raw
        .boxes
        .into_iter()
        .zip(raw.scores)
        .zip(raw.labels)
        .filter(|((_, score), _)| *score >= score_threshold)
        .map(|((xyxy, score), label)| Detection {
            xyxy,
            score,
            label: labels.resolve(label),
        })
        .collect();

    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    detections.truncate(MAX_DETECTIONS);
    detections
}
