pub mod callbacks;
pub mod commands;
pub mod gateway;
pub mod keyboards;
pub mod links;
pub mod messages;
pub mod router;
pub mod upload;

use std::error::Error;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

use crate::bot::commands::Command;
use crate::bot::router::CommandRouter;
use crate::config::BotConfig;
use crate::models::OwnerId;
use crate::services::downloader::UrlDownloader;
use crate::services::orchestrator::{JobOrchestrator, MediaGateway};
use crate::services::sessions::Sessions;

pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Shared dependencies injected into every handler
#[derive(Clone)]
pub struct BotState {
    pub config: Arc<BotConfig>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub router: Arc<CommandRouter>,
    pub sessions: Sessions,
    pub downloader: Arc<dyn UrlDownloader>,
    pub gateway: Arc<dyn MediaGateway>,
}

/// The user a message came from; channel posts fall back to the chat
pub fn message_owner(msg: &Message) -> OwnerId {
    msg.from
        .as_ref()
        .map(|u| OwnerId(u.id.0 as i64))
        .unwrap_or(OwnerId(msg.chat.id.0))
}

impl BotState {
    pub fn supported_formats(&self) -> Vec<&str> {
        self.config.supported_formats()
    }
}

pub fn schema() -> UpdateHandler<Box<dyn Error + Send + Sync + 'static>> {
    let command_handler = teloxide::filter_command::<Command, _>().endpoint(commands::handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(Message::filter_text().endpoint(links::handle_link))
        .branch(dptree::endpoint(upload::handle_upload));

    let callback_handler = Update::filter_callback_query().endpoint(callbacks::handle_callback);

    dptree::entry()
        .branch(message_handler)
        .branch(callback_handler)
}
