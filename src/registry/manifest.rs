//! 本地清单模型仓库
//!
//! 以 TOML 清单记录注册模型的版本与阶段，工件保存在 `<artifact_root>/<run_id>/<path>`。
//! 适用于无 MLflow 的离线部署和测试。

use crate::api::error::{RegistryError, StorageError};
use crate::registry::client::{ModelVersion, RegistryClient};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// 清单文件格式版本
const MANIFEST_VERSION: &str = "1.0";

/// 清单模型仓库
pub struct ManifestRegistry {
    manifest_path: PathBuf,
    artifact_root: PathBuf,
    // 串行化读-改-写
    write_lock: Mutex<()>,
}

/// 一个已注册模型
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisteredModel {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

/// 清单中的版本记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: u64,
    pub stage: String,
    pub source: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// 清单数据（用于序列化）
#[derive(Debug, Serialize, Deserialize)]
struct ManifestData {
    version: String,
    #[serde(default)]
    models: BTreeMap<String, RegisteredModel>,
}

impl Default for ManifestData {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            models: BTreeMap::new(),
        }
    }
}

impl From<&VersionEntry> for ModelVersion {
    fn from(entry: &VersionEntry) -> Self {
        Self {
            version: entry.version,
            stage: entry.stage.clone(),
            source: entry.source.clone(),
            run_id: entry.run_id.clone(),
        }
    }
}

impl ManifestRegistry {
    /// 创建新的清单仓库
    pub fn new(manifest_path: impl AsRef<Path>, artifact_root: impl AsRef<Path>) -> Self {
        Self {
            manifest_path: manifest_path.as_ref().to_path_buf(),
            artifact_root: artifact_root.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// 工件根目录
    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    async fn load(&self) -> std::result::Result<ManifestData, RegistryError> {
        if !self.manifest_path.exists() {
            return Ok(ManifestData::default());
        }

        let content = tokio::fs::read_to_string(&self.manifest_path)
            .await
            .map_err(|e| RegistryError::Unavailable(format!("Failed to read manifest: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| RegistryError::Unavailable(format!("Failed to parse manifest: {}", e)))
    }

    async fn save(&self, data: &ManifestData) -> Result<()> {
        if let Some(parent) = self.manifest_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::PathNotFound(format!("Failed to create manifest directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(data)
            .map_err(|e| StorageError::InvalidFile(format!("Failed to serialize manifest: {}", e)))?;

        tokio::fs::write(&self.manifest_path, content)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("Failed to write manifest: {}", e)).into())
    }

    /// 登记一个新版本，返回分配的版本号（阶段为 `None`）
    pub async fn register_version(
        &self,
        model_name: &str,
        source: &str,
        run_id: Option<&str>,
    ) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut data = self.load().await?;

        let model = data.models.entry(model_name.to_string()).or_default();
        let version = model.versions.iter().map(|v| v.version).max().unwrap_or(0) + 1;
        model.versions.push(VersionEntry {
            version,
            stage: "None".to_string(),
            source: source.to_string(),
            run_id: run_id.map(str::to_string),
            created_at: Some(Utc::now()),
        });

        self.save(&data).await?;
        tracing::info!(model = model_name, version, source, "Registered model version");
        Ok(version)
    }

    /// 将版本切换到指定阶段
    ///
    /// `archive_existing` 为 true 时，原先处于该阶段的其他版本转为 `Archived`。
    pub async fn transition_stage(
        &self,
        model_name: &str,
        version: u64,
        stage: &str,
        archive_existing: bool,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut data = self.load().await?;

        let model = data.models.get_mut(model_name).ok_or_else(|| {
            RegistryError::Unavailable(format!("Registered model {} not found", model_name))
        })?;
        if !model.versions.iter().any(|v| v.version == version) {
            return Err(RegistryError::Unavailable(format!(
                "Version {} of {} not found",
                version, model_name
            ))
            .into());
        }

        for entry in &mut model.versions {
            if entry.version == version {
                entry.stage = stage.to_string();
            } else if archive_existing && entry.stage == stage {
                entry.stage = "Archived".to_string();
            }
        }

        self.save(&data).await?;
        tracing::info!(model = model_name, version, stage, "Transitioned model version");
        Ok(())
    }

    /// 上传文件作为运行工件，返回 `runs:/<run_id>/<path>` 形式的来源
    pub async fn log_artifact(&self, run_id: &str, artifact_path: &str, src: &Path) -> Result<String> {
        let dst = self.artifact_root.join(run_id).join(artifact_path);
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::WriteFailed(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::copy(src, &dst).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to store artifact {}: {}", dst.display(), e))
        })?;
        Ok(format!("runs:/{}/{}", run_id, artifact_path))
    }

    /// 列出注册模型（名称 -> 版本记录）
    pub async fn models(&self) -> Result<BTreeMap<String, RegisteredModel>> {
        Ok(self.load().await?.models)
    }
}

async fn copy_tree(src: &Path, dst: &Path) -> std::result::Result<(), RegistryError> {
    let fail = |p: &Path, e: std::io::Error| {
        RegistryError::DownloadFailed(format!("{}: {}", p.display(), e))
    };

    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to).await.map_err(|e| fail(&to, e))?;
        let mut entries = tokio::fs::read_dir(&from).await.map_err(|e| fail(&from, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| fail(&from, e))? {
            let target = to.join(entry.file_name());
            let file_type = entry.file_type().await.map_err(|e| fail(&entry.path(), e))?;
            if file_type.is_dir() {
                pending.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), &target)
                    .await
                    .map_err(|e| fail(&entry.path(), e))?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RegistryClient for ManifestRegistry {
    fn tracking_uri(&self) -> String {
        format!("manifest:{}", self.manifest_path.display())
    }

    async fn search_model_versions(&self, model_name: &str) -> Result<Vec<ModelVersion>> {
        let data = self.load().await?;
        Ok(data
            .models
            .get(model_name)
            .map(|model| model.versions.iter().map(ModelVersion::from).collect())
            .unwrap_or_default())
    }

    async fn download_artifact(&self, run_id: &str, path: &str, dst_dir: &Path) -> Result<PathBuf> {
        let src = self.artifact_root.join(run_id).join(path);
        if !src.exists() {
            return Err(RegistryError::MissingArtifact(src).into());
        }

        let name = src
            .file_name()
            .ok_or_else(|| RegistryError::UnsupportedSource(format!("runs:/{}/{}", run_id, path)))?;
        let dst = dst_dir.join(name);

        if src.is_dir() {
            copy_tree(&src, &dst).await?;
        } else {
            tokio::fs::copy(&src, &dst).await.map_err(|e| {
                RegistryError::DownloadFailed(format!("{}: {}", src.display(), e))
            })?;
        }
        Ok(dst)
    }
}
