//! 模型仓库集成
//!
//! 查询仓库中指定阶段（默认 `Production`）的模型版本，并把工件落地为本地检查点。

pub mod client;
pub mod manifest;
pub mod mlflow;
pub mod resolver;

pub use client::{ModelVersion, RegistryClient};
pub use manifest::ManifestRegistry;
pub use mlflow::MlflowClient;
pub use resolver::{ArtifactSource, RegistryInfo, RegistryPointer, RegistryResolver};
