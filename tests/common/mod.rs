//! 集成测试公共工具

#![allow(dead_code)]

use detectforge::inference::backends::RegionHeadWeights;
use detectforge::models::CheckpointFile;
use detectforge::storage::write_checkpoint;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// 偏向 `person` 的检查点（默认三个目标类别 + 背景）
pub fn person_checkpoint() -> CheckpointFile {
    CheckpointFile {
        model_state_dict: Some(
            RegionHeadWeights::zeros(4)
                .with_class_bias(1, 8.0)
                .into_state_dict(),
        ),
        target_classes: None,
        internal_to_name: None,
    }
}

/// 偏向 `car` 的检查点
pub fn car_checkpoint() -> CheckpointFile {
    CheckpointFile {
        model_state_dict: Some(
            RegionHeadWeights::zeros(4)
                .with_class_bias(2, 8.0)
                .into_state_dict(),
        ),
        target_classes: None,
        internal_to_name: None,
    }
}

/// 权重形状与类别数不匹配的检查点
pub fn mismatched_checkpoint() -> CheckpointFile {
    CheckpointFile {
        model_state_dict: Some(RegionHeadWeights::zeros(2).into_state_dict()),
        target_classes: Some(vec!["person".to_string(), "car".to_string(), "airplane".to_string()]),
        internal_to_name: None,
    }
}

pub async fn write(path: &Path, checkpoint: &CheckpointFile) {
    write_checkpoint(path, checkpoint).await.unwrap();
}

pub fn set_age(path: &Path, secs_ago: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
        .unwrap();
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 128]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}
