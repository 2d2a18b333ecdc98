pub mod http;
pub mod poller;
pub mod state;

pub use state::AppState;

use crate::config::Config;
use crate::Result;
use std::time::Duration;

/// 启动服务器
///
/// 先加载初始模型（失败即退出），再按配置启动仓库轮询与 HTTP 服务。
pub async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting server...");

    let state = AppState::new(config)?;
    state.manager.initialize().await?;
    tracing::info!(active = ?state.manager.active_info(), "Initial model loaded");

    let registry = &state.config.registry;
    if registry.enabled {
        if let Some(secs) = registry.poll_interval_secs.filter(|s| *s > 0) {
            tracing::info!(interval_secs = secs, "Starting registry poller");
            poller::spawn_registry_poller(state.manager.clone(), Duration::from_secs(secs));
        }
    }

    http::serve(state).await
}
