use teloxide::prelude::*;
use teloxide::types::{FileMeta, ParseMode};

use crate::bot::{BotState, HandlerResult, keyboards, message_owner, messages};
use crate::models::IncomingFile;
use crate::services::sessions::PendingUpload;
use crate::utils::validation::sanitize_filename;

fn incoming(meta: &FileMeta, file_name: String, mime_type: Option<String>) -> IncomingFile {
    IncomingFile {
        file_id: meta.id.0.clone(),
        file_name,
        mime_type,
        size: u64::from(meta.size),
    }
}

/// Extracts the attached media, if any. Nameless media gets a name from its unique id.
pub fn incoming_file(msg: &Message) -> Option<IncomingFile> {
    if let Some(doc) = msg.document() {
        let name = doc
            .file_name
            .clone()
            .unwrap_or_else(|| format!("document_{}", doc.file.unique_id));
        return Some(incoming(
            &doc.file,
            name,
            doc.mime_type.as_ref().map(|m| m.to_string()),
        ));
    }
    if let Some(video) = msg.video() {
        let name = video
            .file_name
            .clone()
            .unwrap_or_else(|| format!("video_{}.mp4", video.file.unique_id));
        return Some(incoming(
            &video.file,
            name,
            video.mime_type.as_ref().map(|m| m.to_string()),
        ));
    }
    if let Some(audio) = msg.audio() {
        let name = audio
            .file_name
            .clone()
            .unwrap_or_else(|| format!("audio_{}.mp3", audio.file.unique_id));
        return Some(incoming(
            &audio.file,
            name,
            audio.mime_type.as_ref().map(|m| m.to_string()),
        ));
    }
    if let Some(voice) = msg.voice() {
        let name = format!("voice_{}.ogg", voice.file.unique_id);
        return Some(incoming(
            &voice.file,
            name,
            voice.mime_type.as_ref().map(|m| m.to_string()),
        ));
    }
    if let Some(note) = msg.video_note() {
        let name = format!("video_note_{}.mp4", note.file.unique_id);
        return Some(incoming(&note.file, name, None));
    }
    None
}

pub async fn handle_upload(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(mut file) = incoming_file(&msg) else {
        bot.send_message(msg.chat.id, messages::UPLOAD_HINT).await?;
        return Ok(());
    };

    let owner = message_owner(&msg);

    tracing::info!(
        "📎 Upload from user {}: {} ({} bytes)",
        owner,
        file.file_name,
        file.size
    );

    let validator = state.orchestrator.validator();
    let checked = sanitize_filename(&file.file_name).and_then(|name| {
        validator
            .validate(&name, file.mime_type.as_deref(), file.size)
            .map(|_| name)
    });

    let name = match checked {
        Ok(name) => name,
        Err(e) => {
            tracing::info!("Rejected upload {}: {}", file.file_name, e);
            bot.send_message(
                msg.chat.id,
                messages::upload_rejected(&e, &state.supported_formats()),
            )
            .parse_mode(ParseMode::Html)
            .await?;
            return Ok(());
        }
    };
    file.file_name = name;

    let prompt = messages::rights_prompt(&file.file_name, file.size);
    state
        .sessions
        .uploads
        .insert(owner, PendingUpload::new(file, msg.chat.id.0));

    let sent = bot
        .send_message(msg.chat.id, prompt)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::rights())
        .await?;
    state.sessions.uploads.set_prompt(owner, sent.id.0);

    Ok(())
}
