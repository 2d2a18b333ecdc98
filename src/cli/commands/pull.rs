use crate::api::error::RegistryError;
use crate::config::Config;
use crate::registry::{client, RegistryResolver};
use crate::storage::CheckpointStore;
use crate::Result;

/// 将仓库生产版本落地到检查点目录
pub async fn pull(config: &Config) -> Result<()> {
    let registry = &config.registry;
    if !registry.enabled {
        return Err(RegistryError::Disabled.into());
    }

    let client = client::from_config(registry)?;
    let resolver = RegistryResolver::new(
        client,
        CheckpointStore::from_config(config),
        registry.stage.clone(),
    );

    let Some(pointer) = resolver.resolve_production(&registry.model_name).await else {
        println!(
            "No {} version registered for {}",
            registry.stage, registry.model_name
        );
        return Ok(());
    };

    tracing::info!(model = %registry.model_name, version = pointer.version, "Pulling model");
    let path = resolver.materialize_artifact(&pointer).await?;
    println!("v{} -> {}", pointer.version, path.display());
    Ok(())
}
