use crate::api::error::ApiError;
use crate::api::request::{parse_score_threshold, UploadForm};
use crate::api::response::{BatchFailure, BatchItem, BatchResponse, PredictResponse};
use crate::server::state::AppState;
use crate::Result;
use axum::extract::{Multipart, State};
use axum::Json;
use std::time::Instant;

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// 单张图像预测
pub async fn predict(State(state): State<AppState>, multipart: Multipart) -> Result<Json<PredictResponse>> {
    let started = Instant::now();
    let mut form = UploadForm::read(multipart).await?;
    let threshold = parse_score_threshold(
        form.score_threshold.as_deref(),
        state.config.inference.score_threshold,
    )?;
    let upload = form.require_image()?;

    let prediction = state.manager.predict_bytes(upload.bytes, threshold).await?;
    tracing::info!(
        filename = ?upload.filename,
        detections = prediction.detections.len(),
        inference_ms = prediction.inference_ms,
        "Prediction served"
    );

    Ok(Json(PredictResponse {
        ok: true,
        filename: upload.filename,
        prediction,
        request_ms: elapsed_ms(started),
    }))
}

/// 批量预测，结果顺序与上传顺序一致
pub async fn predict_multi(State(state): State<AppState>, multipart: Multipart) -> Result<Json<BatchResponse>> {
    let started = Instant::now();
    let form = UploadForm::read(multipart).await?;
    let threshold = parse_score_threshold(
        form.score_threshold.as_deref(),
        state.config.inference.score_threshold,
    )?;
    if form.images.is_empty() {
        return Err(ApiError::InvalidRequest("missing form field: images".to_string()).into());
    }

    let (filenames, payloads): (Vec<_>, Vec<_>) = form
        .images
        .into_iter()
        .map(|upload| (upload.filename, upload.bytes))
        .unzip();

    let outcomes = state.manager.predict_batch(payloads, threshold).await?;
    let request_ms = elapsed_ms(started);

    let results = filenames
        .into_iter()
        .zip(outcomes)
        .map(|(filename, outcome)| match outcome {
            Ok(prediction) => BatchItem::Ok(PredictResponse {
                ok: true,
                filename,
                prediction,
                request_ms,
            }),
            Err(e) => {
                tracing::warn!(filename = ?filename, error = %e, "Batch item failed");
                BatchItem::Failed(BatchFailure {
                    ok: false,
                    filename,
                    error: e.to_string(),
                })
            }
        })
        .collect();

    Ok(Json(BatchResponse { ok: true, results }))
}
