//! 检测结果定义

use serde::{Deserialize, Serialize};

/// 单个检测框
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// 边界框 `[x1, y1, x2, y2]`（像素坐标）
    pub xyxy: [f32; 4],
    /// 置信度，范围 [0, 1]
    pub score: f32,
    /// 类别名称
    pub label: String,
}

/// 单张图像的预测结果
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// 生成该结果的检查点文件名
    pub checkpoint: Option<String>,
    pub image_w: u32,
    pub image_h: u32,
    /// 推理耗时（毫秒）
    pub inference_ms: f64,
    /// 过滤后是否存在检测结果
    pub found: bool,
    pub message: String,
    pub detections: Vec<Detection>,
}

impl Prediction {
    /// 根据检测列表填充 `found` 与 `message`
    pub fn new(
        checkpoint: Option<String>,
        (image_w, image_h): (u32, u32),
        inference_ms: f64,
        detections: Vec<Detection>,
    ) -> Self {
        let found = !detections.is_empty();
        Self {
            checkpoint,
            image_w,
            image_h,
            inference_ms,
            found,
            message: if found { "ok" } else { "not found" }.to_string(),
            detections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_prediction_is_not_found() {
        let prediction = Prediction::new(None, (10, 10), 1.0, vec![]);
        assert!(!prediction.found);
        assert_eq!(prediction.message, "not found");
    }

    #[test]
    fn test_prediction_found() {
        let detection = Detection {
            xyxy: [0.0, 0.0, 5.0, 5.0],
            score: 0.9,
            label: "car".to_string(),
        };
        let prediction = Prediction::new(Some("best_2.pt".into()), (10, 10), 1.0, vec![detection]);
        assert!(prediction.found);
        assert_eq!(prediction.message, "ok");
    }
}
