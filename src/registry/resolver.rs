//! 仓库指针解析
//!
//! 把 (模型名, 阶段) 解析为具体版本，并把该版本的工件落地到本地检查点目录，
//! 文件名为 `registry_v<version>_<basename>`。

use crate::api::error::{RegistryError, StorageError};
use crate::registry::client::{ModelVersion, RegistryClient};
use crate::storage::CheckpointStore;
use crate::Result;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 工件来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// 运行相对路径：`runs:/<run-id>/<path>` 或 `run:<run-id>/<path>`
    Run { run_id: String, path: String },
    /// `file:` URI 指向的本地文件
    File(PathBuf),
}

impl ArtifactSource {
    /// 解析来源描述
    pub fn parse(source: &str) -> std::result::Result<Self, RegistryError> {
        let run_relative = source
            .strip_prefix("runs:/")
            .or_else(|| source.strip_prefix("run:"));

        if let Some(rest) = run_relative {
            let rest = rest.trim_start_matches('/');
            return match rest.split_once('/') {
                Some((run_id, path)) if !run_id.is_empty() && !path.trim_matches('/').is_empty() => {
                    Ok(Self::Run {
                        run_id: run_id.to_string(),
                        path: path.trim_matches('/').to_string(),
                    })
                }
                _ => Err(RegistryError::UnsupportedSource(source.to_string())),
            };
        }

        if source.starts_with("file:") {
            return Ok(Self::File(file_uri_to_path(source)));
        }

        Err(RegistryError::UnsupportedSource(source.to_string()))
    }
}

/// 把 `file:` URI 转成本地路径
///
/// 支持 `file:///abs`、`file://host/abs` 与 `file:c:/...`，并做百分号解码。
/// 盘符前多余的分隔符会被去掉（`/C:/x` → `C:/x`）。
pub fn file_uri_to_path(uri: &str) -> PathBuf {
    let rest = uri.strip_prefix("file:").unwrap_or(uri);

    let raw = match rest.strip_prefix("//") {
        Some(after) if after.starts_with('/') => after,
        Some(after) => {
            let (authority, tail) = match after.find('/') {
                Some(idx) => after.split_at(idx),
                None => (after, ""),
            };
            if is_drive(authority) {
                after
            } else {
                tail
            }
        }
        None => rest,
    };

    let decoded = percent_decode_str(raw).decode_utf8_lossy().into_owned();
    let trimmed = match decoded.strip_prefix('/') {
        Some(tail) if tail.get(..2).is_some_and(is_drive) => tail.to_string(),
        _ => decoded,
    };
    PathBuf::from(trimmed)
}

fn is_drive(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// 已解析的仓库指针
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryPointer {
    pub model_name: String,
    pub stage: String,
    pub version: u64,
    pub run_id: Option<String>,
    pub source: String,
}

/// 仓库状态（仅用于展示）
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryInfo {
    pub tracking_uri: String,
    pub registered_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 生产版本对应的指针，供健康检查同步使用
    #[serde(skip)]
    pub pointer: Option<RegistryPointer>,
}

/// 在版本列表中选出指定阶段的最高版本
pub fn select_stage<'a>(versions: &'a [ModelVersion], stage: &str) -> Option<&'a ModelVersion> {
    versions
        .iter()
        .filter(|v| v.stage == stage)
        .max_by_key(|v| v.version)
}

/// 仓库指针解析器
#[derive(Clone)]
pub struct RegistryResolver {
    client: Arc<dyn RegistryClient>,
    store: CheckpointStore,
    stage: String,
}

impl RegistryResolver {
    /// 创建解析器
    pub fn new(client: Arc<dyn RegistryClient>, store: CheckpointStore, stage: impl Into<String>) -> Self {
        Self {
            client,
            store,
            stage: stage.into(),
        }
    }

    /// 跟随的阶段
    pub fn stage(&self) -> &str {
        &self.stage
    }

    fn pointer(&self, model_name: &str, version: &ModelVersion) -> RegistryPointer {
        RegistryPointer {
            model_name: model_name.to_string(),
            stage: self.stage.clone(),
            version: version.version,
            run_id: version.run_id.clone(),
            source: version.source.clone(),
        }
    }

    /// 解析生产版本；查询失败记录日志并返回 None
    pub async fn resolve_production(&self, model_name: &str) -> Option<RegistryPointer> {
        match self.client.search_model_versions(model_name).await {
            Ok(versions) => select_stage(&versions, &self.stage).map(|v| self.pointer(model_name, v)),
            Err(e) => {
                tracing::warn!(model = model_name, error = %e, "Registry query failed");
                None
            }
        }
    }

    /// 描述仓库状态，总是成功
    pub async fn describe(&self, model_name: &str) -> RegistryInfo {
        let mut info = RegistryInfo {
            tracking_uri: self.client.tracking_uri(),
            registered_model: model_name.to_string(),
            ..Default::default()
        };

        let versions = match self.client.search_model_versions(model_name).await {
            Ok(versions) => versions,
            Err(e) => {
                tracing::warn!(model = model_name, error = %e, "Registry query failed");
                info.error = Some(e.to_string());
                return info;
            }
        };

        if let Some(production) = select_stage(&versions, &self.stage) {
            info.production_version = Some(production.version);
            info.production_run_id = production.run_id.clone();
            info.pointer = Some(self.pointer(model_name, production));
        } else if let Some(latest) = versions.iter().max_by_key(|v| v.version) {
            info.latest_version = Some(latest.version);
            info.latest_run_id = latest.run_id.clone();
            info.latest_stage = Some(latest.stage.clone());
            info.note = Some(format!("No version of {} is in stage {}", model_name, self.stage));
        } else {
            info.note = Some(format!("No versions registered for {}", model_name));
        }

        info
    }

    /// 将指针指向的工件落地到检查点目录，返回本地路径
    pub async fn materialize_artifact(&self, pointer: &RegistryPointer) -> Result<PathBuf> {
        let source = ArtifactSource::parse(&pointer.source)?;
        self.store.ensure_dir().await?;

        match source {
            ArtifactSource::Run { run_id, path } => {
                let basename = file_name(Path::new(&path), &pointer.source)?;
                let target = self.target_path(pointer.version, &basename);
                self.download_run_artifact(&run_id, &path, &basename, pointer.version, &target)
                    .await?;
                tracing::info!(
                    version = pointer.version,
                    run_id = %run_id,
                    path = %target.display(),
                    "Materialized registry artifact"
                );
                Ok(target)
            }
            ArtifactSource::File(src) => {
                let exists = tokio::fs::try_exists(&src).await.unwrap_or(false);
                if !exists {
                    return Err(RegistryError::MissingArtifact(src).into());
                }
                let basename = file_name(&src, &pointer.source)?;
                let target = self.target_path(pointer.version, &basename);
                copy_into_place(&src, &target).await?;
                Ok(target)
            }
        }
    }

    fn target_path(&self, version: u64, basename: &str) -> PathBuf {
        self.store.path_for(&format!("registry_v{}_{}", version, basename))
    }

    async fn download_run_artifact(
        &self,
        run_id: &str,
        path: &str,
        basename: &str,
        version: u64,
        target: &Path,
    ) -> Result<()> {
        let nonce = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let staging = self
            .store
            .dir()
            .join(".staging")
            .join(format!("v{}_{}", version, nonce));
        tokio::fs::create_dir_all(&staging).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to create {}: {}", staging.display(), e))
        })?;

        let result = self.fetch_staged(run_id, path, basename, &staging, target).await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            tracing::debug!(path = %staging.display(), error = %e, "Failed to clean staging directory");
        }
        result
    }

    async fn fetch_staged(
        &self,
        run_id: &str,
        path: &str,
        basename: &str,
        staging: &Path,
        target: &Path,
    ) -> Result<()> {
        let downloaded = self.client.download_artifact(run_id, path, staging).await?;
        // 目录工件：取其中与原始文件同名的文件
        let file = if downloaded.is_dir() {
            downloaded.join(basename)
        } else {
            downloaded
        };
        if !file.is_file() {
            return Err(RegistryError::MissingArtifact(file).into());
        }
        tokio::fs::rename(&file, target).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to move {}: {}", target.display(), e))
        })?;
        Ok(())
    }
}

fn file_name(path: &Path, source: &str) -> std::result::Result<String, RegistryError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| RegistryError::UnsupportedSource(source.to_string()))
}

async fn copy_into_place(src: &Path, target: &Path) -> Result<()> {
    if let (Ok(a), Ok(b)) = (tokio::fs::canonicalize(src).await, tokio::fs::canonicalize(target).await) {
        if a == b {
            return Ok(());
        }
    }

    let partial = target.with_extension("partial");
    tokio::fs::copy(src, &partial).await.map_err(|e| {
        RegistryError::DownloadFailed(format!("Failed to copy {}: {}", src.display(), e))
    })?;
    tokio::fs::rename(&partial, target).await.map_err(|e| {
        StorageError::WriteFailed(format!("Failed to move {}: {}", target.display(), e))
    })?;
    Ok(())
}
