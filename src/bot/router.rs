use std::sync::Arc;
use teloxide::utils::html::escape;

use crate::bot::commands::Command;
use crate::bot::messages;
use crate::config::BotConfig;
use crate::error::MediaError;
use crate::models::OwnerId;
use crate::services::storage::StorageService;

/// Maps each command to its handler and renders the reply as HTML.
///
/// Independent of Telegram so it can be driven directly in tests.
pub struct CommandRouter {
    storage: Arc<dyn StorageService>,
    video_formats: Vec<String>,
    audio_formats: Vec<String>,
    max_file_size: u64,
}

impl CommandRouter {
    pub fn new(config: &BotConfig, storage: Arc<dyn StorageService>) -> Self {
        Self {
            storage,
            video_formats: config.video_formats.clone(),
            audio_formats: config.audio_formats.clone(),
            max_file_size: config.max_file_size,
        }
    }

    pub async fn dispatch(&self, owner: OwnerId, command: Command) -> String {
        let result = match command {
            Command::Start => Ok(messages::welcome()),
            Command::Help => Ok(messages::help(
                &self.video_formats,
                &self.audio_formats,
                self.max_file_size,
            )),
            Command::Files => self.files(owner).await,
            Command::Delete(name) => self.delete(owner, name.trim()).await,
            Command::Clear => self.clear(owner).await,
        };

        result.unwrap_or_else(|e| {
            tracing::warn!("Command failed for user {} [{}]: {}", owner, e.code(), e);
            escape(&e.user_message())
        })
    }

    async fn files(&self, owner: OwnerId) -> Result<String, MediaError> {
        let files = self.storage.list(owner).await?;
        let total = self.storage.total_size(owner).await?;
        Ok(messages::file_list(&files, total))
    }

    async fn delete(&self, owner: OwnerId, name: &str) -> Result<String, MediaError> {
        if name.is_empty() {
            return Ok(messages::delete_usage().to_string());
        }
        self.storage.delete(owner, name).await?;
        Ok(messages::file_deleted(name))
    }

    async fn clear(&self, owner: OwnerId) -> Result<String, MediaError> {
        let removed = self.storage.clear(owner).await?;
        Ok(messages::storage_cleared(removed))
    }
}
