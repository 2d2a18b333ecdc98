use crate::api::error::ApiError;
use axum::extract::Multipart;
use serde::Deserialize;

/// 日志接口默认返回的行数
pub const DEFAULT_LOG_LINES: usize = 200;
/// 日志接口单次最多返回的行数
pub const MAX_LOG_LINES: usize = 10_000;

/// `/logs` 与 `/retrain-progress` 的查询参数
///
/// `ts` 只用于前端绕过缓存，服务端忽略。
#[derive(Debug, Default, Deserialize)]
pub struct TailQuery {
    pub lines: Option<usize>,
    pub ts: Option<i64>,
}

impl TailQuery {
    pub fn lines(&self) -> usize {
        self.lines.unwrap_or(DEFAULT_LOG_LINES).min(MAX_LOG_LINES)
    }
}

/// 上传的文件
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// 解析后的 multipart 表单
#[derive(Debug, Default)]
pub struct UploadForm {
    /// `image` 字段
    pub image: Option<Upload>,
    /// `images` / `images[]` 字段，按提交顺序
    pub images: Vec<Upload>,
    pub score_threshold: Option<String>,
    pub yolo_label_text: Option<String>,
}

impl UploadForm {
    /// 读取整个表单；未知字段忽略
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);

            match name.as_str() {
                "image" | "images" | "images[]" => {
                    let bytes = field.bytes().await.map_err(|e| {
                        ApiError::InvalidRequest(format!("failed to read field {}: {}", name, e))
                    })?;
                    let upload = Upload {
                        filename,
                        bytes: bytes.to_vec(),
                    };
                    if name == "image" {
                        form.image = Some(upload);
                    } else {
                        form.images.push(upload);
                    }
                }
                "score_threshold" | "yolo_label_text" => {
                    let text = field.text().await.map_err(|e| {
                        ApiError::InvalidRequest(format!("failed to read field {}: {}", name, e))
                    })?;
                    if name == "score_threshold" {
                        form.score_threshold = Some(text);
                    } else {
                        form.yolo_label_text = Some(text);
                    }
                }
                other => tracing::debug!(field = other, "Ignoring unknown form field"),
            }
        }

        Ok(form)
    }

    /// `image` 字段，缺失时报错
    pub fn require_image(&mut self) -> Result<Upload, ApiError> {
        self.image
            .take()
            .ok_or_else(|| ApiError::InvalidRequest("missing form field: image".to_string()))
    }
}

/// 解析置信度阈值；未提供时使用默认值
pub fn parse_score_threshold(raw: Option<&str>, default: f32) -> Result<f32, ApiError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(default),
        Some(raw) => raw,
    };

    let value: f32 = raw
        .parse()
        .map_err(|_| ApiError::InvalidRequest(format!("score_threshold must be a number, got {:?}", raw)))?;
    check_score_threshold(value)
}

/// 阈值必须在 [0, 1] 内（NaN 不通过）
pub fn check_score_threshold(value: f32) -> Result<f32, ApiError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ApiError::InvalidRequest(format!(
            "score_threshold must be within [0, 1], got {}",
            value
        )));
    }
    Ok(value)
}
