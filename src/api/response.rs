use crate::core::{ActiveInfo, RegistrySync};
use crate::models::Prediction;
use crate::retrain::RetrainReport;
use crate::storage::CheckpointRef;
use serde::Serialize;

/// `GET /`
#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub ok: bool,
    pub message: String,
    pub version: String,
}

/// `POST /predict`
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub ok: bool,
    pub filename: Option<String>,
    #[serde(flatten)]
    pub prediction: Prediction,
    /// 请求总耗时（毫秒），含上传解析
    pub request_ms: f64,
}

/// 批量预测中单项的失败
#[derive(Debug, Serialize)]
pub struct BatchFailure {
    pub ok: bool,
    pub filename: Option<String>,
    pub error: String,
}

/// 批量预测中的一项
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Ok(PredictResponse),
    Failed(BatchFailure),
}

/// `POST /predict-multi`
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub ok: bool,
    pub results: Vec<BatchItem>,
}

/// `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: String,
    pub active_model: ActiveInfo,
    pub registry_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistrySync>,
}

/// `POST /new-data`
#[derive(Debug, Serialize)]
pub struct NewDataResponse {
    pub ok: bool,
    pub saved_image: String,
    pub saved_label: String,
}

/// `POST /retrain`
#[derive(Debug, Serialize)]
pub struct RetrainResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub report: RetrainReport,
}

/// `POST /reload-model`
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub ok: bool,
    pub active_model: ActiveInfo,
}

/// `GET /models`
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub ok: bool,
    pub checkpoint_dir: String,
    pub pattern: String,
    /// 当前活动检查点路径
    pub active: Option<String>,
    pub models: Vec<CheckpointRef>,
}
