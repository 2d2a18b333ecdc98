//! MLflow tracking server 客户端
//!
//! 通过 REST API 查询模型版本并下载运行工件：
//! - `GET /api/2.0/mlflow/model-versions/search`（分页）
//! - `GET /api/2.0/mlflow/artifacts/list`
//! - `GET /get-artifact`

use crate::api::error::RegistryError;
use crate::registry::client::{ModelVersion, RegistryClient};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const PAGE_SIZE: &str = "200";

/// MLflow REST 客户端
pub struct MlflowClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    model_versions: Vec<RawModelVersion>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawModelVersion {
    version: String,
    #[serde(default)]
    current_stage: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    run_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListArtifactsResponse {
    #[serde(default)]
    files: Vec<ArtifactFile>,
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    path: String,
    #[serde(default)]
    is_dir: bool,
}

impl RawModelVersion {
    fn into_version(self) -> std::result::Result<ModelVersion, RegistryError> {
        let version = self.version.trim().parse::<u64>().map_err(|_| {
            RegistryError::Unavailable(format!("unexpected model version {:?}", self.version))
        })?;
        Ok(ModelVersion {
            version,
            stage: self.current_stage,
            source: self.source,
            run_id: self.run_id.filter(|id| !id.is_empty()),
        })
    }
}

impl MlflowClient {
    /// 创建客户端，`timeout` 作用于每个 HTTP 请求
    pub fn new(tracking_uri: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: tracking_uri.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> std::result::Result<reqwest::Response, String> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, text));
        }
        Ok(resp)
    }

    async fn list_artifacts(&self, run_id: &str, path: &str) -> std::result::Result<Vec<ArtifactFile>, String> {
        let url = format!("{}/api/2.0/mlflow/artifacts/list", self.base_url);
        let resp = self.get(&url, &[("run_id", run_id), ("path", path)]).await?;
        let listing: ListArtifactsResponse = resp.json().await.map_err(|e| e.to_string())?;
        Ok(listing.files)
    }

    async fn fetch_file(&self, run_id: &str, path: &str, dest: &Path) -> Result<()> {
        let url = format!("{}/get-artifact", self.base_url);
        let mut resp = self
            .get(&url, &[("path", path), ("run_uuid", run_id)])
            .await
            .map_err(|e| RegistryError::DownloadFailed(format!("{}: {}", path, e)))?;

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            RegistryError::DownloadFailed(format!("Failed to create {}: {}", dest.display(), e))
        })?;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| RegistryError::DownloadFailed(format!("{}: {}", path, e)))?
        {
            file.write_all(&chunk).await.map_err(|e| {
                RegistryError::DownloadFailed(format!("Failed to write {}: {}", dest.display(), e))
            })?;
        }
        file.flush().await.map_err(|e| {
            RegistryError::DownloadFailed(format!("Failed to write {}: {}", dest.display(), e))
        })?;

        tracing::debug!(run_id, path, dest = %dest.display(), "Downloaded artifact");
        Ok(())
    }
}

fn basename(path: &str) -> std::result::Result<&str, RegistryError> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| RegistryError::UnsupportedSource(format!("artifact path {:?} has no file name", path)))
}

#[async_trait]
impl RegistryClient for MlflowClient {
    fn tracking_uri(&self) -> String {
        self.base_url.clone()
    }

    async fn search_model_versions(&self, model_name: &str) -> Result<Vec<ModelVersion>> {
        let url = format!("{}/api/2.0/mlflow/model-versions/search", self.base_url);
        let filter = format!("name='{}'", model_name.replace('\'', "\\'"));

        let mut versions = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("filter", filter.as_str()), ("max_results", PAGE_SIZE)];
            if let Some(token) = page_token.as_deref() {
                query.push(("page_token", token));
            }

            let resp = self
                .get(&url, &query)
                .await
                .map_err(RegistryError::Unavailable)?;
            let page: SearchResponse = resp
                .json()
                .await
                .map_err(|e| RegistryError::Unavailable(format!("malformed search response: {}", e)))?;

            for raw in page.model_versions {
                versions.push(raw.into_version()?);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(versions)
    }

    async fn download_artifact(&self, run_id: &str, path: &str, dst_dir: &Path) -> Result<PathBuf> {
        let name = basename(path)?;

        // 列出路径下的内容：非空说明是目录
        let listing = match self.list_artifacts(run_id, path).await {
            Ok(files) => files,
            Err(e) => {
                tracing::debug!(run_id, path, error = %e, "Artifact listing failed, fetching as file");
                Vec::new()
            }
        };

        if listing.is_empty() {
            let dest = dst_dir.join(name);
            self.fetch_file(run_id, path, &dest).await?;
            return Ok(dest);
        }

        let dir = dst_dir.join(name);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            RegistryError::DownloadFailed(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        for file in listing.iter().filter(|f| !f.is_dir) {
            let dest = dir.join(basename(&file.path)?);
            self.fetch_file(run_id, &file.path, &dest).await?;
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn search(Query(q): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
        assert_eq!(q.get("filter").map(String::as_str), Some("name='detector'"));
        match q.get("page_token").map(String::as_str) {
            None => Json(serde_json::json!({
                "model_versions": [
                    {"name": "detector", "version": "1", "current_stage": "Archived",
                     "source": "runs:/r1/checkpoints/best_1.pt", "run_id": "r1"}
                ],
                "next_page_token": "page-2"
            })),
            Some(_) => Json(serde_json::json!({
                "model_versions": [
                    {"name": "detector", "version": "2", "current_stage": "Production",
                     "source": "runs:/r2/checkpoints", "run_id": "r2"}
                ]
            })),
        }
    }

    async fn list(Query(q): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
        if q.get("path").map(String::as_str) == Some("checkpoints") {
            Json(serde_json::json!({
                "root_uri": "mlflow-artifacts:/0/r2/artifacts",
                "files": [
                    {"path": "checkpoints/best_7.pt", "is_dir": false, "file_size": 5},
                    {"path": "checkpoints/extra", "is_dir": true}
                ]
            }))
        } else {
            Json(serde_json::json!({ "root_uri": "mlflow-artifacts:/0/r1/artifacts" }))
        }
    }

    async fn artifact(Query(q): Query<HashMap<String, String>>) -> String {
        format!("bytes-of:{}", q.get("path").cloned().unwrap_or_default())
    }

    async fn mock_server() -> String {
        let app = Router::new()
            .route("/api/2.0/mlflow/model-versions/search", get(search))
            .route("/api/2.0/mlflow/artifacts/list", get(list))
            .route("/get-artifact", get(artifact));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_search_follows_pages() {
        let base = mock_server().await;
        let client = MlflowClient::new(&base, Duration::from_secs(5)).unwrap();

        let versions = client.search_model_versions("detector").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].version, 2);
        assert_eq!(versions[1].stage, "Production");
        assert_eq!(versions[1].run_id.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_download_single_file() {
        let base = mock_server().await;
        let client = MlflowClient::new(&base, Duration::from_secs(5)).unwrap();
        let temp_dir = TempDir::new().unwrap();

        let path = client
            .download_artifact("r1", "checkpoints/best_1.pt", temp_dir.path())
            .await
            .unwrap();
        assert_eq!(path, temp_dir.path().join("best_1.pt"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "bytes-of:checkpoints/best_1.pt");
    }

    #[tokio::test]
    async fn test_download_directory() {
        let base = mock_server().await;
        let client = MlflowClient::new(&base, Duration::from_secs(5)).unwrap();
        let temp_dir = TempDir::new().unwrap();

        let path = client
            .download_artifact("r2", "checkpoints", temp_dir.path())
            .await
            .unwrap();
        assert!(path.is_dir());
        assert_eq!(
            std::fs::read_to_string(path.join("best_7.pt")).unwrap(),
            "bytes-of:checkpoints/best_7.pt"
        );
    }

    #[tokio::test]
    async fn test_unreachable_registry() {
        let client = MlflowClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = client.search_model_versions("detector").await.unwrap_err();
        assert!(matches!(
            err,
            crate::DetectForgeError::Registry(RegistryError::Unavailable(_))
        ));
    }

    #[test]
    fn test_non_numeric_version_rejected() {
        let raw = RawModelVersion {
            version: "v2".to_string(),
            current_stage: "Production".to_string(),
            source: String::new(),
            run_id: Some(String::new()),
        };
        assert!(raw.into_version().is_err());
    }
}
