use crate::config::BotConfig;
use teloxide::Bot;
use tracing::info;

pub fn setup_bot(config: &BotConfig) -> anyhow::Result<Bot> {
    if config.bot_token.is_empty() {
        anyhow::bail!("TELEGRAM_BOT_TOKEN must be set");
    }

    let bot = Bot::new(&config.bot_token);

    if config.use_local_api {
        let url = url::Url::parse(&config.local_api_url)?;
        info!("🏠 Using local Bot API server: {}", url);
        return Ok(bot.set_api_url(url));
    }

    info!("☁️  Using Telegram cloud Bot API");
    Ok(bot)
}
