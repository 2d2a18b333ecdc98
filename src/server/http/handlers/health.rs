use crate::api::response::{HealthResponse, RootResponse};
use crate::server::state::AppState;
use axum::extract::State;
use axum::Json;

/// 根路径
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        ok: true,
        message: "detectforge object detection API".to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// 健康检查端点
///
/// 附带一次仓库同步：生产版本变化时切换模型，失败只记录在响应中。
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.manager.sync_registry().await;

    Json(HealthResponse {
        ok: true,
        version: crate::VERSION.to_string(),
        active_model: state.manager.active_info(),
        registry_enabled: state.manager.registry_enabled(),
        registry,
    })
}
