//! 新样本存储
//!
//! 保存用户提交的图像与 YOLO 标注文本，供后续增量训练使用。
//! 标注文本不做校验，原样（去除首尾空白并补一个换行）写入。

use crate::api::error::StorageError;
use crate::config::Config;
use crate::Result;
use chrono::Local;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// 已保存的样本
#[derive(Debug, Clone, Serialize)]
pub struct SavedSample {
    pub image_name: String,
    pub label_name: String,
    pub image_path: PathBuf,
    pub label_path: PathBuf,
}

/// 样本存储
#[derive(Debug, Clone)]
pub struct SampleStore {
    images_dir: PathBuf,
    labels_dir: PathBuf,
}

impl SampleStore {
    /// 在 `root/images` 与 `root/labels` 下保存样本
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            images_dir: root.join("images"),
            labels_dir: root.join("labels"),
        }
    }

    /// 从配置创建
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.storage.samples_dir)
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn labels_dir(&self) -> &Path {
        &self.labels_dir
    }

    /// 保存一张图像及其标注
    pub async fn save(
        &self,
        original_name: Option<&str>,
        image: &[u8],
        label_text: &str,
    ) -> Result<SavedSample> {
        for dir in [&self.images_dir, &self.labels_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                StorageError::WriteFailed(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        let (stem, ext) = sanitize_name(original_name.unwrap_or("image"));
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

        // 同一秒内重名时追加序号
        let mut attempt = 0u32;
        let (image_path, mut image_file, base) = loop {
            let base = if attempt == 0 {
                format!("{}_{}", stem, timestamp)
            } else {
                format!("{}_{}_{}", stem, timestamp, attempt)
            };
            let path = self.images_dir.join(format!("{}{}", base, ext));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file, base),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 1000 => attempt += 1,
                Err(e) => {
                    return Err(StorageError::WriteFailed(format!(
                        "Failed to create {}: {}",
                        path.display(),
                        e
                    ))
                    .into())
                }
            }
        };

        let label_path = self.labels_dir.join(format!("{}.txt", base));
        let content = format!("{}\n", label_text.trim());

        // 任一写入失败都删除两个文件，不留下不成对的样本
        if let Err(e) = write_pair(&mut image_file, &image_path, image, &label_path, &content).await {
            drop(image_file);
            for path in [&image_path, &label_path] {
                if let Err(rm) = tokio::fs::remove_file(path).await {
                    if rm.kind() != ErrorKind::NotFound {
                        tracing::warn!(path = %path.display(), error = %rm, "Failed to remove partial sample");
                    }
                }
            }
            return Err(e);
        }

        tracing::info!(
            image = %image_path.display(),
            label = %label_path.display(),
            "Saved new training sample"
        );

        Ok(SavedSample {
            image_name: file_name(&image_path),
            label_name: file_name(&label_path),
            image_path,
            label_path,
        })
    }
}

async fn write_pair(
    image_file: &mut tokio::fs::File,
    image_path: &Path,
    image: &[u8],
    label_path: &Path,
    label: &str,
) -> Result<()> {
    let image_err =
        |e: std::io::Error| StorageError::WriteFailed(format!("Failed to write {}: {}", image_path.display(), e));
    image_file.write_all(image).await.map_err(image_err)?;
    image_file.flush().await.map_err(image_err)?;

    tokio::fs::write(label_path, label).await.map_err(|e| {
        StorageError::WriteFailed(format!("Failed to write {}: {}", label_path.display(), e))
    })?;
    Ok(())
}

/// 取上传文件名的安全部分，返回 (stem, 小写扩展名含点)
fn sanitize_name(original: &str) -> (String, String) {
    // 只保留最后一个路径分量，防止目录穿越
    let base = original
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(original);
    let path = Path::new(base);

    let stem: String = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "image".to_string() } else { stem };

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|s| format!(".{}", s.to_ascii_lowercase()))
        .unwrap_or_else(|| ".jpg".to_string());

    (stem, ext)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}
