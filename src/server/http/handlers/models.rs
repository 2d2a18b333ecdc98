use crate::api::response::{ModelsResponse, ReloadResponse};
use crate::server::state::AppState;
use crate::Result;
use axum::extract::State;
use axum::Json;

/// 列出本地检查点
pub async fn list_models(State(state): State<AppState>) -> Result<Json<ModelsResponse>> {
    let store = state.manager.store();
    let models = store.list().await?;

    Ok(Json(ModelsResponse {
        ok: true,
        checkpoint_dir: store.dir().display().to_string(),
        pattern: store.pattern(),
        active: state.manager.active_info().checkpoint,
        models,
    }))
}

/// 强制切换到最新的本地检查点
pub async fn reload_model(State(state): State<AppState>) -> Result<Json<ReloadResponse>> {
    tracing::info!("Reload requested");
    state.manager.switch_to_local_latest().await?;

    Ok(Json(ReloadResponse {
        ok: true,
        active_model: state.manager.active_info(),
    }))
}
