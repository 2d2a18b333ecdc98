use crate::api::error::{ApiError, StorageError};
use crate::api::request::check_score_threshold;
use crate::config::Config;
use crate::core::ModelManager;
use crate::Result;
use std::path::Path;

/// 用最新的本地检查点预测一张图像，结果以 JSON 打印
pub async fn predict(config: &Config, image: &Path, threshold: Option<f32>) -> Result<()> {
    let threshold = check_score_threshold(threshold.unwrap_or(config.inference.score_threshold))?;
    let manager = ModelManager::from_config(config)?;
    let checkpoint = manager.switch_to_local_latest().await?;
    tracing::info!(checkpoint = %checkpoint.name, "Loaded checkpoint");

    let bytes = tokio::fs::read(image)
        .await
        .map_err(|e| StorageError::ReadFailed(format!("{}: {}", image.display(), e)))?;

    let prediction = manager.predict_bytes(bytes, threshold).await?;
    let json = serde_json::to_string_pretty(&prediction)
        .map_err(|e| ApiError::Internal(format!("Failed to serialize prediction: {}", e)))?;
    println!("{}", json);
    Ok(())
}
