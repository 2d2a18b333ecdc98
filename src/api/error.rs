use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::PathBuf;
use thiserror::Error;

/// DetectForge 错误类型
#[derive(Debug, Error)]
pub enum DetectForgeError {
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Retrain error: {0}")]
    Retrain(#[from] RetrainError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// 检查点错误
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("No checkpoint matching {pattern} in {dir}")]
    NotFound { dir: PathBuf, pattern: String },

    #[error("Failed to load checkpoint {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

impl CheckpointError {
    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// 模型仓库（Registry）错误
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry artifact missing: {0}")]
    MissingArtifact(PathBuf),

    #[error("Unsupported artifact source: {0}")]
    UnsupportedSource(String),

    #[error("Failed to download artifact: {0}")]
    DownloadFailed(String),

    #[error("Registry integration is disabled")]
    Disabled,
}

/// 推理错误
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("No model has been loaded yet")]
    NotReady,

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Inference failed: {0}")]
    Failed(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),
}

/// 存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage path not found: {0}")]
    PathNotFound(String),

    #[error("Failed to read file: {0}")]
    ReadFailed(String),

    #[error("Failed to write file: {0}")]
    WriteFailed(String),

    #[error("Invalid file: {0}")]
    InvalidFile(String),
}

/// 重训练错误
#[derive(Debug, Error)]
pub enum RetrainError {
    #[error("A retrain job is already running")]
    Busy,

    #[error("Failed to launch retrain job: {0}")]
    Launch(String),

    #[error("Retrain job timed out after {0}s")]
    Timeout(u64),

    #[error("Retrain job exited with {}", exit_label(.code))]
    ExternalJobFailure { code: Option<i32> },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// API 错误
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl DetectForgeError {
    /// 映射为 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Inference(InferenceError::NotReady) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Inference(InferenceError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            Self::Api(ApiError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            Self::Checkpoint(CheckpointError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Registry(RegistryError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
            Self::Registry(RegistryError::DownloadFailed(_)) => StatusCode::BAD_GATEWAY,
            Self::Registry(RegistryError::Disabled) => StatusCode::CONFLICT,
            Self::Retrain(RetrainError::Busy) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DetectForgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }
        let body = serde_json::json!({
            "ok": false,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, DetectForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let not_ready: DetectForgeError = InferenceError::NotReady.into();
        assert_eq!(not_ready.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let bad_image: DetectForgeError = InferenceError::InvalidImage("truncated".into()).into();
        assert_eq!(bad_image.status_code(), StatusCode::BAD_REQUEST);

        let busy: DetectForgeError = RetrainError::Busy.into();
        assert_eq!(busy.status_code(), StatusCode::CONFLICT);

        let load: DetectForgeError = CheckpointError::load("best_1.pt", "bad weights").into();
        assert_eq!(load.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_job_failure_message() {
        let err = RetrainError::ExternalJobFailure { code: Some(2) };
        assert_eq!(err.to_string(), "Retrain job exited with status 2");

        let err = RetrainError::ExternalJobFailure { code: None };
        assert_eq!(err.to_string(), "Retrain job exited with a signal");
    }
}
