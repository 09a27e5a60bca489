use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::bot::{BotState, HandlerResult, keyboards, message_owner, messages};
use crate::services::downloader::{find_supported_url, looks_like_link};
use crate::services::sessions::PendingLink;

/// Plain text: a supported link gets an info card and the format menu
pub async fn handle_link(bot: Bot, msg: Message, text: String, state: BotState) -> HandlerResult {
    let Some(url) = find_supported_url(&text) else {
        let reply = if looks_like_link(&text) {
            messages::LINK_NOT_PARSED
        } else {
            messages::UPLOAD_HINT
        };
        bot.send_message(msg.chat.id, reply)
            .parse_mode(ParseMode::Html)
            .await?;
        return Ok(());
    };

    let owner = message_owner(&msg);
    tracing::info!("🔗 Link from user {}: {}", owner, url);

    let status = bot
        .send_message(msg.chat.id, messages::fetching_info())
        .parse_mode(ParseMode::Html)
        .await?;

    let info = match state.downloader.fetch_info(url.as_str()).await {
        Ok(info) => info,
        Err(e) => {
            tracing::info!("No media info for {}: {}", url, e);
            bot.edit_message_text(msg.chat.id, status.id, e.user_message())
                .await?;
            return Ok(());
        }
    };

    let card = messages::link_found(&info);
    let mut pending = PendingLink::new(url.to_string(), info, msg.chat.id.0);
    pending.prompt_message_id = Some(status.id.0);
    state.sessions.links.insert(owner, pending);

    bot.edit_message_text(msg.chat.id, status.id, card)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::download_options())
        .await?;

    Ok(())
}
