use crate::api::request::TailQuery;
use crate::api::response::RetrainResponse;
use crate::server::http::handlers::logs::plain_text_tail;
use crate::server::state::AppState;
use crate::Result;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;

/// 运行重训练任务
pub async fn retrain(State(state): State<AppState>) -> Result<Json<RetrainResponse>> {
    tracing::info!("Retrain requested");
    let report = state.retrain.run().await?;
    Ok(Json(RetrainResponse { ok: true, report }))
}

/// 重训练进度日志
pub async fn retrain_progress(State(state): State<AppState>, Query(query): Query<TailQuery>) -> Result<Response> {
    plain_text_tail(Some(state.retrain.progress_log()), query.lines()).await
}
