use crate::config::BotConfig;
use crate::models::OwnerId;
use crate::services::cleanup::CleanupService;
use crate::services::storage::LocalStorageService;
use crate::utils::keyed_mutex::KeyedMutex;
use std::sync::Arc;
use tracing::info;

/// Creates the storage and temp roots and the per-user file store on top of them
pub async fn setup_storage(
    config: &BotConfig,
    locks: KeyedMutex<OwnerId>,
) -> anyhow::Result<Arc<LocalStorageService>> {
    tokio::fs::create_dir_all(&config.storage_dir).await?;
    tokio::fs::create_dir_all(&config.temp_dir).await?;

    info!(
        "📂 Storage: {} (temp: {})",
        config.storage_dir.display(),
        config.temp_dir.display()
    );

    Ok(Arc::new(LocalStorageService::new(
        config.storage_dir.clone(),
        CleanupService::from_config(config),
        locks,
    )))
}
