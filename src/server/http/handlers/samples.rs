use crate::api::error::ApiError;
use crate::api::request::UploadForm;
use crate::api::response::NewDataResponse;
use crate::server::state::AppState;
use crate::Result;
use axum::extract::{Multipart, State};
use axum::Json;

/// 保存新的标注样本
pub async fn new_data(State(state): State<AppState>, multipart: Multipart) -> Result<Json<NewDataResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form.require_image()?;
    let label = form
        .yolo_label_text
        .take()
        .ok_or_else(|| ApiError::InvalidRequest("missing form field: yolo_label_text".to_string()))?;

    let saved = state
        .samples
        .save(upload.filename.as_deref(), &upload.bytes, &label)
        .await?;

    Ok(Json(NewDataResponse {
        ok: true,
        saved_image: saved.image_path.display().to_string(),
        saved_label: saved.label_path.display().to_string(),
    }))
}
