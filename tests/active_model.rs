//! 活动模型生命周期集成测试
//!
//! 使用本地清单仓库驱动管理器，覆盖本地切换、仓库切换的幂等性与失败隔离。

mod common;

use async_trait::async_trait;
use detectforge::core::{ModelManager, ModelSource, RegistryBinding, SwitchOutcome};
use detectforge::inference::backends::RegionHeadBackend;
use detectforge::registry::{ManifestRegistry, ModelVersion, RegistryClient, RegistryResolver};
use detectforge::storage::CheckpointStore;
use detectforge::models::CheckpointFile;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const MODEL: &str = "detector";

/// 记录下载次数的仓库
struct CountingRegistry {
    inner: ManifestRegistry,
    downloads: AtomicUsize,
}

#[async_trait]
impl RegistryClient for CountingRegistry {
    fn tracking_uri(&self) -> String {
        self.inner.tracking_uri()
    }

    async fn search_model_versions(&self, model_name: &str) -> detectforge::Result<Vec<ModelVersion>> {
        self.inner.search_model_versions(model_name).await
    }

    async fn download_artifact(&self, run_id: &str, path: &str, dst_dir: &Path) -> detectforge::Result<PathBuf> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.inner.download_artifact(run_id, path, dst_dir).await
    }
}

struct Fixture {
    dir: TempDir,
    registry: Arc<CountingRegistry>,
    manager: Arc<ModelManager>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(CountingRegistry {
            inner: ManifestRegistry::new(dir.path().join("registry.toml"), dir.path().join("artifacts")),
            downloads: AtomicUsize::new(0),
        });
        let store = CheckpointStore::new(dir.path().join("ckpt"), "best_", "pt");
        let binding = RegistryBinding {
            resolver: RegistryResolver::new(registry.clone(), store.clone(), "Production"),
            model_name: MODEL.to_string(),
        };
        let manager = Arc::new(ModelManager::new(
            store,
            Arc::new(RegionHeadBackend::new()),
            Some(binding),
        ));
        Self { dir, registry, manager }
    }

    fn ckpt(&self, name: &str) -> PathBuf {
        self.dir.path().join("ckpt").join(name)
    }

    fn downloads(&self) -> usize {
        self.registry.downloads.load(Ordering::SeqCst)
    }

    /// 上传工件并登记为生产版本，返回版本号
    async fn publish(&self, run_id: &str, checkpoint: &CheckpointFile) -> u64 {
        let scratch = self.dir.path().join("scratch").join(run_id).join("best_run.pt");
        common::write(&scratch, checkpoint).await;

        let manifest = &self.registry.inner;
        let source = manifest
            .log_artifact(run_id, "checkpoints/best_run.pt", &scratch)
            .await
            .unwrap();
        let version = manifest.register_version(MODEL, &source, Some(run_id)).await.unwrap();
        manifest
            .transition_stage(MODEL, version, "Production", true)
            .await
            .unwrap();
        version
    }
}

#[tokio::test]
async fn local_switch_picks_newest_checkpoint() {
    let fx = Fixture::new();
    common::write(&fx.ckpt("best_1.pt"), &common::person_checkpoint()).await;
    common::write(&fx.ckpt("best_2.pt"), &common::car_checkpoint()).await;
    common::set_age(&fx.ckpt("best_1.pt"), 120);
    common::set_age(&fx.ckpt("best_2.pt"), 10);

    let loaded = fx.manager.switch_to_local_latest().await.unwrap();
    assert_eq!(loaded.name, "best_2.pt");

    let info = fx.manager.active_info();
    assert_eq!(info.source, Some(ModelSource::Local));
    assert!(info.checkpoint.unwrap().ends_with("best_2.pt"));

    let prediction = fx.manager.predict_bytes(common::png(40, 30), 0.5).await.unwrap();
    assert!(prediction.detections.iter().all(|d| d.label == "car"));
}

#[tokio::test]
async fn registry_switch_is_idempotent() {
    let fx = Fixture::new();
    let version = fx.publish("run-a", &common::person_checkpoint()).await;

    let first = fx.manager.switch_to_registry_production().await.unwrap();
    assert_eq!(first, SwitchOutcome::Switched { version });
    let loaded_at = fx.manager.active_info().loaded_at;

    let second = fx.manager.switch_to_registry_production().await.unwrap();
    assert_eq!(second, SwitchOutcome::NoChange);
    assert_eq!(fx.downloads(), 1);
    assert_eq!(fx.manager.active_info().loaded_at, loaded_at);

    let info = fx.manager.active_info();
    assert_eq!(info.source, Some(ModelSource::Registry));
    assert_eq!(info.version, Some(version));
    assert!(info.checkpoint.unwrap().ends_with(&format!("registry_v{}_best_run.pt", version)));
}

#[tokio::test]
async fn no_production_version_is_no_change() {
    let fx = Fixture::new();
    let outcome = fx.manager.switch_to_registry_production().await.unwrap();
    assert_eq!(outcome, SwitchOutcome::NoChange);
    assert!(!fx.manager.active_info().ready);
    assert_eq!(fx.downloads(), 0);
}

#[tokio::test]
async fn sync_follows_new_production_version() {
    let fx = Fixture::new();
    fx.publish("run-a", &common::person_checkpoint()).await;
    let sync = fx.manager.sync_registry().await.unwrap();
    assert_eq!(sync.switched_to, Some(1));

    // 版本未变：不再下载
    let sync = fx.manager.sync_registry().await.unwrap();
    assert_eq!(sync.switched_to, None);
    assert_eq!(fx.downloads(), 1);

    fx.publish("run-b", &common::car_checkpoint()).await;
    let sync = fx.manager.sync_registry().await.unwrap();
    assert_eq!(sync.switched_to, Some(2));
    assert_eq!(sync.info.production_version, Some(2));
    assert_eq!(fx.manager.active_info().version, Some(2));

    let prediction = fx.manager.predict_bytes(common::png(16, 16), 0.5).await.unwrap();
    assert!(prediction.detections.iter().all(|d| d.label == "car"));
}

#[tokio::test]
async fn corrupt_registry_artifact_keeps_previous_model() {
    let fx = Fixture::new();
    fx.publish("run-a", &common::person_checkpoint()).await;
    fx.manager.sync_registry().await.unwrap();
    let before = fx.manager.active_info();

    fx.publish("run-b", &common::mismatched_checkpoint()).await;
    let sync = fx.manager.sync_registry().await.unwrap();
    assert!(sync.switched_to.is_none());
    assert!(sync.switch_error.unwrap().contains("incompatible shape"));
    assert_eq!(fx.manager.active_info(), before);

    // 旧模型继续服务
    let prediction = fx.manager.predict_bytes(common::png(16, 16), 0.5).await.unwrap();
    assert!(prediction.found);
}

#[tokio::test]
async fn corrupt_local_checkpoint_keeps_previous_model() {
    let fx = Fixture::new();
    common::write(&fx.ckpt("best_1.pt"), &common::person_checkpoint()).await;
    common::set_age(&fx.ckpt("best_1.pt"), 60);
    fx.manager.switch_to_local_latest().await.unwrap();
    let before = fx.manager.active_info();

    std::fs::write(fx.ckpt("best_2.pt"), b"{\"model_state_dict\": 7}").unwrap();
    assert!(fx.manager.switch_to_local_latest().await.is_err());
    assert_eq!(fx.manager.active_info(), before);
}

#[tokio::test]
async fn startup_falls_back_to_registry() {
    let fx = Fixture::new();
    fx.publish("run-a", &common::person_checkpoint()).await;

    fx.manager.initialize().await.unwrap();
    let info = fx.manager.active_info();
    assert_eq!(info.source, Some(ModelSource::Registry));
    assert_eq!(info.version, Some(1));
}

#[tokio::test]
async fn startup_fails_without_any_model() {
    let fx = Fixture::new();
    assert!(fx.manager.initialize().await.is_err());
    assert!(!fx.manager.active_info().ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn predictions_survive_concurrent_switches() {
    let fx = Fixture::new();
    common::write(&fx.ckpt("best_1.pt"), &common::person_checkpoint()).await;
    fx.manager.switch_to_local_latest().await.unwrap();
    fx.publish("run-a", &common::car_checkpoint()).await;

    let image = common::png(24, 24);
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let manager = fx.manager.clone();
        let image = image.clone();
        tasks.push(tokio::spawn(async move {
            manager.predict_bytes(image, 0.5).await
        }));
    }
    let switcher = {
        let manager = fx.manager.clone();
        tokio::spawn(async move { manager.switch_to_registry_production().await })
    };

    for task in tasks {
        let prediction = task.await.unwrap().unwrap();
        // 每个请求只看到一份完整的快照
        let labels: Vec<_> = prediction.detections.iter().map(|d| d.label.clone()).collect();
        assert!(labels.iter().all(|l| l == &labels[0]));
    }
    assert_eq!(
        switcher.await.unwrap().unwrap(),
        SwitchOutcome::Switched { version: 1 }
    );
}
