//! 检查点存储
//!
//! 管理本地检查点目录：按命名规则（默认 `best_*.pt`）列出候选文件、
//! 按修改时间选出最新的检查点，并负责反序列化与校验。

use crate::api::error::{CheckpointError, StorageError};
use crate::config::Config;
use crate::models::{CheckpointFile, LoadedCheckpoint};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// 检查点文件引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointRef {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// 文件系统检查点存储
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl CheckpointStore {
    /// 创建新的检查点存储
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// 从配置创建
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.storage.checkpoint_dir,
            config.storage.checkpoint_prefix.clone(),
            config.storage.checkpoint_extension.clone(),
        )
    }

    /// 检查点目录
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 文件名匹配规则（用于日志与错误信息）
    pub fn pattern(&self) -> String {
        format!("{}*.{}", self.prefix, self.extension)
    }

    /// 确保目录存在
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StorageError::PathNotFound(format!(
                "Failed to create checkpoint directory {}: {}",
                self.dir.display(),
                e
            ))
            .into()
        })
    }

    fn matches(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
            && Path::new(name)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == self.extension)
                .unwrap_or(false)
    }

    /// 列出候选检查点，最新的在前
    ///
    /// 按修改时间降序排列；修改时间相同时按文件名降序，保证结果确定。
    pub async fn list(&self) -> Result<Vec<CheckpointRef>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            StorageError::ReadFailed(format!("Failed to read checkpoint directory: {}", e))
        })?;

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            StorageError::ReadFailed(format!("Failed to read directory entry: {}", e))
        })? {
            let name = match entry.file_name().to_str() {
                Some(name) if self.matches(name) => name.to_string(),
                _ => continue,
            };

            let metadata = entry.metadata().await.map_err(|e| {
                StorageError::ReadFailed(format!("Failed to read metadata of {}: {}", name, e))
            })?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().map_err(|e| {
                StorageError::ReadFailed(format!("Failed to read mtime of {}: {}", name, e))
            })?;

            found.push(CheckpointRef {
                path: entry.path(),
                name,
                size: metadata.len(),
                modified: DateTime::<Utc>::from(modified),
            });
        }

        found.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(found)
    }

    /// 查找最新的本地检查点
    pub async fn find_latest_local(&self) -> Result<CheckpointRef> {
        self.list().await?.into_iter().next().ok_or_else(|| {
            CheckpointError::NotFound {
                dir: self.dir.clone(),
                pattern: self.pattern(),
            }
            .into()
        })
    }

    /// 从路径加载检查点
    ///
    /// 读取在异步运行时中完成，JSON 解析与校验放到阻塞线程池。
    pub async fn load_from_path(&self, path: &Path) -> Result<LoadedCheckpoint> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CheckpointError::load(path, format!("read failed: {}", e)))?;

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let file: CheckpointFile = serde_json::from_slice(&bytes)
                .map_err(|e| CheckpointError::load(&path, format!("malformed checkpoint: {}", e)))?;
            file.into_loaded(&path)
        })
        .await
        .map_err(|e| crate::api::error::ApiError::Internal(format!("Checkpoint loader panicked: {}", e)))?
        .map_err(Into::into)
    }

    /// 目录内的目标路径
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

/// 将检查点写入文件（训练工具与测试使用）
pub async fn write_checkpoint(path: &Path, checkpoint: &CheckpointFile) -> Result<()> {
    let bytes = serde_json::to_vec(checkpoint)
        .map_err(|e| StorageError::WriteFailed(format!("Failed to serialize checkpoint: {}", e)))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| StorageError::WriteFailed(format!("Failed to write {}: {}", path.display(), e)).into())
}
