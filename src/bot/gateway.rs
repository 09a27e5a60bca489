use async_trait::async_trait;
use std::path::Path;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, ParseMode};
use teloxide::{ApiError, RequestError};
use tokio::io::AsyncWriteExt;

use crate::error::MediaError;
use crate::models::MediaKind;
use crate::services::orchestrator::MediaGateway;

/// `MediaGateway` backed by the Telegram Bot API
pub struct TelegramGateway {
    bot: Bot,
    local_api: bool,
}

impl TelegramGateway {
    pub fn new(bot: Bot, local_api: bool) -> Self {
        Self { bot, local_api }
    }
}

fn transfer_error(e: RequestError) -> MediaError {
    match e {
        RequestError::Api(ApiError::RequestEntityTooLarge) => {
            MediaError::Transfer("file is too large for Telegram".to_string())
        }
        other => {
            tracing::error!("Telegram request failed: {}", other);
            MediaError::Transfer(other.to_string())
        }
    }
}

#[async_trait]
impl MediaGateway for TelegramGateway {
    async fn download(&self, file_id: &str, dest: &Path) -> Result<u64, MediaError> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(transfer_error)?;

        // A local Bot API server hands out absolute paths on its own disk
        if self.local_api {
            let local = Path::new(&file.path);
            if local.is_absolute() && tokio::fs::try_exists(local).await.unwrap_or(false) {
                tracing::debug!("Copying {} from the local Bot API store", local.display());
                return Ok(tokio::fs::copy(local, dest).await?);
            }
        }

        let mut out = tokio::fs::File::create(dest).await?;
        self.bot
            .download_file(&file.path, &mut out)
            .await
            .map_err(|e| {
                tracing::error!("Download of {} failed: {}", file_id, e);
                MediaError::Transfer(e.to_string())
            })?;
        out.flush().await?;

        Ok(tokio::fs::metadata(dest).await?.len())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), MediaError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(transfer_error)?;
        Ok(())
    }

    async fn send_file(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        kind: MediaKind,
        caption: &str,
    ) -> Result<(), MediaError> {
        let input = InputFile::file(path.to_path_buf()).file_name(file_name.to_string());

        tracing::info!("📤 Sending {} to chat {}", file_name, chat_id);

        match kind {
            MediaKind::Audio => {
                self.bot
                    .send_audio(ChatId(chat_id), input)
                    .caption(caption)
                    .await
            }
            MediaKind::Video => {
                self.bot
                    .send_video(ChatId(chat_id), input)
                    .caption(caption)
                    .supports_streaming(true)
                    .await
            }
        }
        .map_err(transfer_error)?;

        Ok(())
    }
}
