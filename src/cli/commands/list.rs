use crate::config::Config;
use crate::storage::CheckpointStore;
use crate::Result;

/// 列出本地检查点，最新的在前
pub async fn list(config: &Config) -> Result<()> {
    let store = CheckpointStore::from_config(config);
    let checkpoints = store.list().await?;

    if checkpoints.is_empty() {
        println!("No checkpoints matching {} in {}", store.pattern(), store.dir().display());
        return Ok(());
    }

    println!("{:<40} {:>12}  {}", "NAME", "SIZE", "MODIFIED");
    for checkpoint in checkpoints {
        println!(
            "{:<40} {:>12}  {}",
            checkpoint.name,
            checkpoint.size,
            checkpoint.modified.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
