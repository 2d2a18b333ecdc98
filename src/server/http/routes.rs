use crate::server::http::handlers;
use crate::server::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// 定义路由
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/predict", post(handlers::predict))
        .route("/predict-multi", post(handlers::predict_multi))
        .route("/new-data", post(handlers::new_data))
        .route("/retrain", post(handlers::retrain))
        .route("/retrain-progress", get(handlers::retrain_progress))
        .route("/reload-model", post(handlers::reload_model))
        .route("/models", get(handlers::list_models))
        .route("/logs", get(handlers::logs))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
