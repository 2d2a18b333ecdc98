//! 活动模型管理器
//!
//! 进程内唯一的活动模型保存在 `ArcSwapOption` 中：预测在入口处取得快照的 `Arc`，
//! 整个请求期间使用同一份快照；切换操作由互斥锁串行化，所有 I/O（仓库查询、
//! 下载、解析、构建检测器）都在最后一次 `store` 之前完成，失败时旧快照保持不变。

use crate::api::error::{InferenceError, RegistryError};
use crate::config::Config;
use crate::core::active::{ActiveInfo, ActiveModel, ModelSource, Provenance};
use crate::inference::{decode_rgb, postprocess, BackendRegistry, DetectionBackend};
use crate::models::Prediction;
use crate::registry::{client, RegistryInfo, RegistryPointer, RegistryResolver};
use crate::storage::{CheckpointRef, CheckpointStore};
use crate::Result;
use arc_swap::ArcSwapOption;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// 仓库绑定：解析器与要跟随的注册模型
#[derive(Clone)]
pub struct RegistryBinding {
    pub resolver: RegistryResolver,
    pub model_name: String,
}

/// 仓库切换结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// 已切换到指定版本
    Switched { version: u64 },
    /// 无生产版本，或已是该版本
    NoChange,
}

/// 一次仓库同步的结果
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySync {
    #[serde(flatten)]
    pub info: RegistryInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switched_to: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch_error: Option<String>,
}

/// 活动模型管理器
pub struct ModelManager {
    active: ArcSwapOption<ActiveModel>,
    switch_lock: Mutex<()>,
    store: CheckpointStore,
    backend: Arc<dyn DetectionBackend>,
    registry: Option<RegistryBinding>,
}

impl ModelManager {
    /// 创建管理器（未加载模型）
    pub fn new(
        store: CheckpointStore,
        backend: Arc<dyn DetectionBackend>,
        registry: Option<RegistryBinding>,
    ) -> Self {
        Self {
            active: ArcSwapOption::empty(),
            switch_lock: Mutex::new(()),
            store,
            backend,
            registry,
        }
    }

    /// 从配置创建
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = CheckpointStore::from_config(config);
        let backend = BackendRegistry::with_builtin().get(&config.inference.backend)?;

        let registry = if config.registry.enabled {
            let client = client::from_config(&config.registry)?;
            Some(RegistryBinding {
                resolver: RegistryResolver::new(client, store.clone(), config.registry.stage.clone()),
                model_name: config.registry.model_name.clone(),
            })
        } else {
            None
        };

        Ok(Self::new(store, backend, registry))
    }

    /// 检查点存储
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// 是否启用了仓库集成
    pub fn registry_enabled(&self) -> bool {
        self.registry.is_some()
    }

    /// 当前快照
    pub fn snapshot(&self) -> Option<Arc<ActiveModel>> {
        self.active.load_full()
    }

    /// 活动模型信息（无锁读取）
    pub fn active_info(&self) -> ActiveInfo {
        match self.active.load().as_deref() {
            Some(model) => ActiveInfo::from(model),
            None => ActiveInfo::not_ready(),
        }
    }

    fn active_registry_version(&self) -> Option<u64> {
        self.active
            .load()
            .as_deref()
            .and_then(ActiveModel::registry_version)
    }

    /// 在旁路构建新快照，不触碰当前活动模型
    async fn build(&self, path: &Path, source: ModelSource, version: Option<u64>) -> Result<ActiveModel> {
        let checkpoint = self.store.load_from_path(path).await?;
        let backend = self.backend.clone();

        let (detector, checkpoint) = tokio::task::spawn_blocking(move || {
            backend.load(&checkpoint).map(|detector| (detector, checkpoint))
        })
        .await
        .map_err(|e| InferenceError::Failed(format!("Detector construction panicked: {}", e)))??;

        Ok(ActiveModel {
            detector,
            labels: checkpoint.labels,
            target_classes: checkpoint.target_classes,
            provenance: Provenance {
                source,
                version,
                checkpoint: checkpoint.path,
                loaded_at: Utc::now(),
            },
        })
    }

    fn install(&self, model: ActiveModel) {
        tracing::info!(
            source = ?model.provenance.source,
            version = ?model.provenance.version,
            checkpoint = %model.provenance.checkpoint.display(),
            classes = ?model.target_classes,
            "Activated model"
        );
        self.active.store(Some(Arc::new(model)));
    }

    /// 切换到最新的本地检查点
    pub async fn switch_to_local_latest(&self) -> Result<CheckpointRef> {
        let _guard = self.switch_lock.lock().await;

        let latest = self.store.find_latest_local().await?;
        let model = self.build(&latest.path, ModelSource::Local, None).await?;
        self.install(model);
        Ok(latest)
    }

    /// 切换到仓库中的生产版本
    ///
    /// 注册模型名称取自构造时的 [`RegistryBinding::model_name`]（即配置项
    /// `registry.model_name`），一个管理器只跟随一个注册模型，因此不再单独传参。
    /// 无生产版本或已是该版本时返回 [`SwitchOutcome::NoChange`]，不会下载或重新加载。
    pub async fn switch_to_registry_production(&self) -> Result<SwitchOutcome> {
        let binding = self.registry.as_ref().ok_or(RegistryError::Disabled)?;
        match binding.resolver.resolve_production(&binding.model_name).await {
            Some(pointer) => self.apply_registry_pointer(&pointer).await,
            None => Ok(SwitchOutcome::NoChange),
        }
    }

    /// 应用已解析的仓库指针
    pub async fn apply_registry_pointer(&self, pointer: &RegistryPointer) -> Result<SwitchOutcome> {
        let binding = self.registry.as_ref().ok_or(RegistryError::Disabled)?;
        let _guard = self.switch_lock.lock().await;

        // 在锁内比较，避免并发同步重复加载同一版本
        if self.active_registry_version() == Some(pointer.version) {
            return Ok(SwitchOutcome::NoChange);
        }

        let path = binding.resolver.materialize_artifact(pointer).await?;
        let model = self
            .build(&path, ModelSource::Registry, Some(pointer.version))
            .await?;
        self.install(model);
        Ok(SwitchOutcome::Switched {
            version: pointer.version,
        })
    }

    /// 健康检查与后台轮询使用的同步流程
    ///
    /// 生产版本与当前已应用版本不同则切换；切换失败只记录，不向上抛出。
    /// 未启用仓库时返回 None。
    pub async fn sync_registry(&self) -> Option<RegistrySync> {
        let binding = self.registry.as_ref()?;
        let info = binding.resolver.describe(&binding.model_name).await;

        let mut sync = RegistrySync {
            info,
            switched_to: None,
            switch_error: None,
        };

        if let Some(pointer) = sync.info.pointer.clone() {
            if self.active_registry_version() != Some(pointer.version) {
                match self.apply_registry_pointer(&pointer).await {
                    Ok(SwitchOutcome::Switched { version }) => sync.switched_to = Some(version),
                    Ok(SwitchOutcome::NoChange) => {}
                    Err(e) => {
                        tracing::error!(version = pointer.version, error = %e, "Registry switch failed");
                        sync.switch_error = Some(e.to_string());
                    }
                }
            }
        }

        Some(sync)
    }

    /// 启动时加载模型
    ///
    /// 先尝试最新的本地检查点；失败且启用了仓库时改用仓库生产版本；都失败则返回错误。
    pub async fn initialize(&self) -> Result<()> {
        let local_err = match self.switch_to_local_latest().await {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };

        if !self.registry_enabled() {
            return Err(local_err);
        }

        tracing::warn!(error = %local_err, "No usable local checkpoint, trying registry");
        match self.switch_to_registry_production().await? {
            SwitchOutcome::Switched { .. } => Ok(()),
            SwitchOutcome::NoChange => Err(local_err),
        }
    }

    /// 对单张图像预测
    pub async fn predict_bytes(&self, bytes: Vec<u8>, score_threshold: f32) -> Result<Prediction> {
        let snapshot = self.snapshot().ok_or(InferenceError::NotReady)?;
        run_prediction(snapshot, bytes, score_threshold).await
    }

    /// 批量预测
    ///
    /// 整个批次使用同一份快照，结果顺序与输入一致；单张失败只影响该项。
    pub async fn predict_batch(
        &self,
        items: Vec<Vec<u8>>,
        score_threshold: f32,
    ) -> Result<Vec<Result<Prediction>>> {
        let snapshot = self.snapshot().ok_or(InferenceError::NotReady)?;
        let tasks = items
            .into_iter()
            .map(|bytes| run_prediction(snapshot.clone(), bytes, score_threshold));
        Ok(futures::future::join_all(tasks).await)
    }
}

async fn run_prediction(
    snapshot: Arc<ActiveModel>,
    bytes: Vec<u8>,
    score_threshold: f32,
) -> Result<Prediction> {
    tokio::task::spawn_blocking(move || -> Result<Prediction> {
        let image = decode_rgb(&bytes)?;
        let dimensions = image.dimensions();

        let started = Instant::now();
        let raw = snapshot.detector.run(&image)?;
        let inference_ms = started.elapsed().as_secs_f64() * 1000.0;

        let detections = postprocess(raw, &snapshot.labels, score_threshold);
        Ok(Prediction::new(
            snapshot.checkpoint_name(),
            dimensions,
            inference_ms,
            detections,
        ))
    })
    .await
    .map_err(|e| InferenceError::Failed(format!("Inference task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::backends::{RegionHeadBackend, RegionHeadWeights};
    use crate::models::CheckpointFile;
    use crate::storage::write_checkpoint;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn checkpoint(confident: bool) -> CheckpointFile {
        // 偏置让 "person" 得分最高
        let weights = if confident {
            RegionHeadWeights::zeros(4).with_class_bias(1, 8.0)
        } else {
            RegionHeadWeights::zeros(4)
        };
        CheckpointFile {
            model_state_dict: Some(weights.into_state_dict()),
            target_classes: None,
            internal_to_name: None,
        }
    }

    fn png() -> Vec<u8> {
        let img = RgbImage::from_pixel(32, 24, Rgb([120, 90, 60]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn manager(temp_dir: &TempDir) -> ModelManager {
        let store = CheckpointStore::new(temp_dir.path(), "best_", "pt");
        ModelManager::new(store, Arc::new(RegionHeadBackend::new()), None)
    }

    #[tokio::test]
    async fn test_not_ready_before_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        assert!(!manager.active_info().ready);
        let err = manager.predict_bytes(png(), 0.5).await.unwrap_err();
        assert!(matches!(
            err,
            crate::DetectForgeError::Inference(InferenceError::NotReady)
        ));
        assert!(manager.predict_batch(vec![png()], 0.5).await.is_err());
    }

    #[tokio::test]
    async fn test_switch_and_predict() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        write_checkpoint(&temp_dir.path().join("best_1.pt"), &checkpoint(true))
            .await
            .unwrap();

        let loaded = manager.switch_to_local_latest().await.unwrap();
        assert_eq!(loaded.name, "best_1.pt");

        let info = manager.active_info();
        assert!(info.ready);
        assert_eq!(info.source, Some(ModelSource::Local));
        assert_eq!(info.classes, vec!["person", "car", "airplane"]);

        let prediction = manager.predict_bytes(png(), 0.5).await.unwrap();
        assert_eq!((prediction.image_w, prediction.image_h), (32, 24));
        assert_eq!(prediction.checkpoint.as_deref(), Some("best_1.pt"));
        assert!(prediction.found);
        assert!(prediction.detections.len() <= 3);
        assert!(prediction.detections.iter().all(|d| d.label == "person"));
    }

    #[tokio::test]
    async fn test_batch_isolates_bad_items() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        write_checkpoint(&temp_dir.path().join("best_1.pt"), &checkpoint(false))
            .await
            .unwrap();
        manager.switch_to_local_latest().await.unwrap();

        let results = manager
            .predict_batch(vec![png(), b"not an image".to_vec(), png()], 0.5)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(crate::DetectForgeError::Inference(InferenceError::InvalidImage(_)))
        ));
        // 均匀分布的 softmax 低于阈值
        let last = results[2].as_ref().unwrap();
        assert!(!last.found);
        assert_eq!(last.message, "not found");
    }

    #[tokio::test]
    async fn test_registry_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        assert!(manager.sync_registry().await.is_none());
        assert!(matches!(
            manager.switch_to_registry_production().await,
            Err(crate::DetectForgeError::Registry(RegistryError::Disabled))
        ));
    }

    #[tokio::test]
    async fn test_initialize_without_checkpoints_fails() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        assert!(manager.initialize().await.is_err());
        assert!(!manager.active_info().ready);
    }
}
