use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;

use crate::bot::{BotState, HandlerResult};
use crate::models::OwnerId;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show the welcome message")]
    Start,
    #[command(description = "how to use the bot")]
    Help,
    #[command(description = "list your stored files")]
    Files,
    #[command(description = "delete a stored file, e.g. /delete song.mp3")]
    Delete(String),
    #[command(description = "delete all stored files")]
    Clear,
}

pub async fn handle_command(bot: Bot, msg: Message, cmd: Command, state: BotState) -> HandlerResult {
    let owner = msg
        .from
        .as_ref()
        .map(|u| OwnerId(u.id.0 as i64))
        .unwrap_or(OwnerId(msg.chat.id.0));

    tracing::debug!("Command {:?} from user {}", cmd, owner);

    let reply = state.router.dispatch(owner, cmd).await;
    bot.send_message(msg.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start", "bot").unwrap(), Command::Start);
        assert_eq!(Command::parse("/files", "bot").unwrap(), Command::Files);
        assert_eq!(
            Command::parse("/delete my song.mp3", "bot").unwrap(),
            Command::Delete("my song.mp3".to_string())
        );
        assert!(Command::parse("/unknown", "bot").is_err());
    }
}
