//! 线性区域头检测后端
//!
//! 内置的轻量评分函数：把图像划分为整图加 `GRID x GRID` 个固定区域，
//! 对每个区域提取颜色统计特征（RGB 均值与标准差），再经过与 Faster R-CNN
//! `box_predictor` 同名、同布局的线性分类头与边框回归头得到类别概率与边框。
//!
//! 权重形状（`C` 为含背景的类别数，`F` 为 [`FEATURES`]）：
//! - `roi_heads.box_predictor.cls_score.weight`: `[C, F]`
//! - `roi_heads.box_predictor.cls_score.bias`: `[C]`
//! - `roi_heads.box_predictor.bbox_pred.weight`: `[4C, F]`
//! - `roi_heads.box_predictor.bbox_pred.bias`: `[4C]`

use crate::api::error::CheckpointError;
use crate::inference::backend::{DetectionBackend, Detector, RawDetections};
use crate::models::{LoadedCheckpoint, StateDict, Tensor};
use crate::Result;
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;

pub const CLS_WEIGHT: &str = "roi_heads.box_predictor.cls_score.weight";
pub const CLS_BIAS: &str = "roi_heads.box_predictor.cls_score.bias";
pub const BBOX_WEIGHT: &str = "roi_heads.box_predictor.bbox_pred.weight";
pub const BBOX_BIAS: &str = "roi_heads.box_predictor.bbox_pred.bias";

/// 每个区域的特征维度
pub const FEATURES: usize = 6;
/// 网格边长（区域数为 `GRID * GRID + 1`）
pub const GRID: u32 = 4;

/// ln(1000 / 16)，与 torchvision 的宽高缩放上限一致
const BBOX_XFORM_CLIP: f32 = 4.135_166_6;

/// 线性区域头后端
#[derive(Debug, Default)]
pub struct RegionHeadBackend;

impl RegionHeadBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectionBackend for RegionHeadBackend {
    fn name(&self) -> &str {
        "region-head"
    }

    fn load(&self, checkpoint: &LoadedCheckpoint) -> Result<Arc<dyn Detector>> {
        let c = checkpoint.num_classes;
        let path = checkpoint.path.as_path();
        let weights = &checkpoint.weights;

        let cls_weight = expect_tensor(weights, CLS_WEIGHT, &[c, FEATURES], path)?;
        let cls_bias = expect_tensor(weights, CLS_BIAS, &[c], path)?;
        let bbox_weight = expect_tensor(weights, BBOX_WEIGHT, &[4 * c, FEATURES], path)?;
        let bbox_bias = expect_tensor(weights, BBOX_BIAS, &[4 * c], path)?;

        Ok(Arc::new(RegionHeadDetector {
            num_classes: c,
            cls_weight: cls_weight.data.clone(),
            cls_bias: cls_bias.data.clone(),
            bbox_weight: bbox_weight.data.clone(),
            bbox_bias: bbox_bias.data.clone(),
        }))
    }
}

fn expect_tensor<'a>(
    weights: &'a StateDict,
    key: &str,
    shape: &[usize],
    path: &Path,
) -> std::result::Result<&'a Tensor, CheckpointError> {
    let tensor = weights
        .get(key)
        .ok_or_else(|| CheckpointError::load(path, format!("missing weight {}", key)))?;
    if tensor.shape != shape {
        return Err(CheckpointError::load(
            path,
            format!(
                "incompatible shape for {}: expected {:?}, found {:?}",
                key, shape, tensor.shape
            ),
        ));
    }
    Ok(tensor)
}

/// 线性区域头检测器
#[derive(Debug)]
pub struct RegionHeadDetector {
    num_classes: usize,
    cls_weight: Vec<f32>,
    cls_bias: Vec<f32>,
    bbox_weight: Vec<f32>,
    bbox_bias: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
struct Region {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

impl Detector for RegionHeadDetector {
    fn run(&self, image: &RgbImage) -> Result<RawDetections> {
        let mut out = RawDetections::default();
        if self.num_classes < 2 {
            return Ok(out);
        }

        for region in regions(image.width(), image.height()) {
            let features = region_features(image, region);

            let logits: Vec<f32> = (0..self.num_classes)
                .map(|c| linear(&self.cls_weight, &self.cls_bias, c, &features))
                .collect();
            let probs = softmax(&logits);

            // 0 为背景
            let (label, score) = probs
                .iter()
                .enumerate()
                .skip(1)
                .fold((1, f32::MIN), |best, (c, &p)| if p > best.1 { (c, p) } else { best });

            let deltas: [f32; 4] = std::array::from_fn(|k| {
                linear(&self.bbox_weight, &self.bbox_bias, 4 * label + k, &features)
            });
            let bbox = decode_box(region, deltas, image.width(), image.height());

            out.push(bbox, score, label as i64);
        }

        Ok(out)
    }
}

fn linear(weight: &[f32], bias: &[f32], row: usize, x: &[f32; FEATURES]) -> f32 {
    let w = &weight[row * FEATURES..(row + 1) * FEATURES];
    w.iter().zip(x).map(|(a, b)| a * b).sum::<f32>() + bias[row]
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// 整图 + 网格区域；图像小于网格时跳过空区域
fn regions(width: u32, height: u32) -> Vec<Region> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let mut regions = vec![Region {
        x: 0,
        y: 0,
        w: width,
        h: height,
    }];
    for gy in 0..GRID {
        for gx in 0..GRID {
            let x0 = width * gx / GRID;
            let x1 = width * (gx + 1) / GRID;
            let y0 = height * gy / GRID;
            let y1 = height * (gy + 1) / GRID;
            if x1 > x0 && y1 > y0 {
                regions.push(Region {
                    x: x0,
                    y: y0,
                    w: x1 - x0,
                    h: y1 - y0,
                });
            }
        }
    }
    regions
}

/// RGB 均值与标准差，归一化到 [0, 1]
fn region_features(image: &RgbImage, region: Region) -> [f32; FEATURES] {
    let mut sum = [0f64; 3];
    let mut sum_sq = [0f64; 3];
    for y in region.y..region.y + region.h {
        for x in region.x..region.x + region.w {
            let px = image.get_pixel(x, y);
            for ch in 0..3 {
                let v = px[ch] as f64 / 255.0;
                sum[ch] += v;
                sum_sq[ch] += v * v;
            }
        }
    }
    let n = (region.w as f64) * (region.h as f64);
    let mut features = [0f32; FEATURES];
    for ch in 0..3 {
        let mean = sum[ch] / n;
        let var = (sum_sq[ch] / n - mean * mean).max(0.0);
        features[ch] = mean as f32;
        features[3 + ch] = var.sqrt() as f32;
    }
    features
}

/// 按 (dx, dy, dw, dh) 回归量修正区域框并裁剪到图像内
fn decode_box(region: Region, deltas: [f32; 4], width: u32, height: u32) -> [f32; 4] {
    let w = region.w as f32;
    let h = region.h as f32;
    let cx = region.x as f32 + 0.5 * w;
    let cy = region.y as f32 + 0.5 * h;

    let [dx, dy, dw, dh] = deltas;
    let pred_cx = cx + dx * w;
    let pred_cy = cy + dy * h;
    let pred_w = w * dw.min(BBOX_XFORM_CLIP).exp();
    let pred_h = h * dh.min(BBOX_XFORM_CLIP).exp();

    let max_x = width as f32;
    let max_y = height as f32;
    [
        (pred_cx - 0.5 * pred_w).clamp(0.0, max_x),
        (pred_cy - 0.5 * pred_h).clamp(0.0, max_y),
        (pred_cx + 0.5 * pred_w).clamp(0.0, max_x),
        (pred_cy + 0.5 * pred_h).clamp(0.0, max_y),
    ]
}

/// 区域头权重构造器
///
/// 用于初始化新的检查点（全零权重，各类别概率相同）或在测试中构造确定的权重。
#[derive(Debug, Clone)]
pub struct RegionHeadWeights {
    num_classes: usize,
    cls_weight: Vec<f32>,
    cls_bias: Vec<f32>,
    bbox_weight: Vec<f32>,
    bbox_bias: Vec<f32>,
}

impl RegionHeadWeights {
    /// `num_classes` 含背景
    pub fn zeros(num_classes: usize) -> Self {
        Self {
            num_classes,
            cls_weight: vec![0.0; num_classes * FEATURES],
            cls_bias: vec![0.0; num_classes],
            bbox_weight: vec![0.0; 4 * num_classes * FEATURES],
            bbox_bias: vec![0.0; 4 * num_classes],
        }
    }

    /// 设置某个类别的分类偏置
    pub fn with_class_bias(mut self, class: usize, bias: f32) -> Self {
        if class < self.num_classes {
            self.cls_bias[class] = bias;
        }
        self
    }

    /// 设置某个类别对某个特征的分类权重
    pub fn with_class_weight(mut self, class: usize, feature: usize, weight: f32) -> Self {
        if class < self.num_classes && feature < FEATURES {
            self.cls_weight[class * FEATURES + feature] = weight;
        }
        self
    }

    pub fn into_state_dict(self) -> StateDict {
        let c = self.num_classes;
        let mut dict = StateDict::new();
        dict.insert(CLS_WEIGHT.to_string(), Tensor::new(vec![c, FEATURES], self.cls_weight));
        dict.insert(CLS_BIAS.to_string(), Tensor::new(vec![c], self.cls_bias));
        dict.insert(BBOX_WEIGHT.to_string(), Tensor::new(vec![4 * c, FEATURES], self.bbox_weight));
        dict.insert(BBOX_BIAS.to_string(), Tensor::new(vec![4 * c], self.bbox_bias));
        dict
    }
}
