use crate::core::ModelManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// 按固定间隔同步仓库生产版本
pub fn spawn_registry_poller(manager: Arc<ModelManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 第一次 tick 立即完成；启动时已经加载过模型
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Some(sync) = manager.sync_registry().await {
                if let Some(version) = sync.switched_to {
                    tracing::info!(version, "Registry poll switched active model");
                }
            }
        }
    })
}
