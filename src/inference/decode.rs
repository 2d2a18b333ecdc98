//! 图像解码

use crate::api::error::InferenceError;
use image::RgbImage;

/// 将上传的字节解码为 RGB8 图像
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, InferenceError> {
    if bytes.is_empty() {
        return Err(InferenceError::InvalidImage("empty upload".to_string()));
    }
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| InferenceError::InvalidImage(e.to_string()))
}
