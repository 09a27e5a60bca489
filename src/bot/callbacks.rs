use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, MessageId, ParseMode};

use crate::bot::{BotState, HandlerResult, keyboards, messages};
use crate::models::{
    AudioBitrate, ConversionRequest, DownloadResolution, DownloadTarget, JobAction, JobSource,
    OutputFormat, OwnerId, TargetKind, VideoResolution,
};
use crate::services::orchestrator::JobRequest;
use crate::services::sessions::AudioTarget;
use crate::utils::validation::file_extension;

const AUDIO_PREFIX: &str = "quality_audio_";
const VIDEO_PREFIX: &str = "quality_video_";
const DOWNLOAD_VIDEO_PREFIX: &str = "dl_video_";

/// Inline keyboard buttons, encoded in the callback data string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    RightsConfirm,
    RightsCancel,
    Cancel,
    Metadata,
    Save,
    ExtractAudio,
    ConvertToMp3,
    ConvertToMp4,
    VideoQuality,
    AudioQuality,
    PickAudio(AudioBitrate),
    PickVideo(VideoResolution),
    DownloadVideo(DownloadResolution),
    DownloadAudio,
    DownloadCancel,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let action = match data {
            "rights_confirm" => Self::RightsConfirm,
            "rights_cancel" => Self::RightsCancel,
            "action_cancel" => Self::Cancel,
            "action_metadata" => Self::Metadata,
            "action_save" => Self::Save,
            "action_extract_audio" => Self::ExtractAudio,
            "convert_to_mp3" => Self::ConvertToMp3,
            "convert_to_mp4" => Self::ConvertToMp4,
            "action_video_quality" => Self::VideoQuality,
            "action_audio_quality" => Self::AudioQuality,
            "dl_audio" => Self::DownloadAudio,
            "dl_cancel" => Self::DownloadCancel,
            other => {
                if let Some(key) = other.strip_prefix(AUDIO_PREFIX) {
                    Self::PickAudio(AudioBitrate::from_key(key)?)
                } else if let Some(key) = other.strip_prefix(VIDEO_PREFIX) {
                    Self::PickVideo(VideoResolution::from_key(key)?)
                } else if let Some(key) = other.strip_prefix(DOWNLOAD_VIDEO_PREFIX) {
                    Self::DownloadVideo(DownloadResolution::from_key(key)?)
                } else {
                    return None;
                }
            }
        };
        Some(action)
    }

    pub fn as_data(&self) -> String {
        match self {
            Self::RightsConfirm => "rights_confirm".to_string(),
            Self::RightsCancel => "rights_cancel".to_string(),
            Self::Cancel => "action_cancel".to_string(),
            Self::Metadata => "action_metadata".to_string(),
            Self::Save => "action_save".to_string(),
            Self::ExtractAudio => "action_extract_audio".to_string(),
            Self::ConvertToMp3 => "convert_to_mp3".to_string(),
            Self::ConvertToMp4 => "convert_to_mp4".to_string(),
            Self::VideoQuality => "action_video_quality".to_string(),
            Self::AudioQuality => "action_audio_quality".to_string(),
            Self::PickAudio(b) => format!("{}{}", AUDIO_PREFIX, b.key()),
            Self::PickVideo(r) => format!("{}{}", VIDEO_PREFIX, r.key()),
            Self::DownloadVideo(r) => format!("{}{}", DOWNLOAD_VIDEO_PREFIX, r.key()),
            Self::DownloadAudio => "dl_audio".to_string(),
            Self::DownloadCancel => "dl_cancel".to_string(),
        }
    }
}

async fn edit(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    text: impl Into<String>,
    markup: Option<InlineKeyboardMarkup>,
) -> HandlerResult {
    let request = bot
        .edit_message_text(chat_id, message_id, text)
        .parse_mode(ParseMode::Html);
    match markup {
        Some(markup) => request.reply_markup(markup).await?,
        None => request.await?,
    };
    Ok(())
}

pub async fn handle_callback(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
        tracing::debug!("Ignoring unknown callback data {:?}", q.data);
        return Ok(());
    };
    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };

    let chat_id = message.chat().id;
    let message_id = message.id();
    let owner = OwnerId(q.from.id.0 as i64);
    // Sessions only answer to the keyboard they were created with
    let prompt = message_id.0;
    let uploads = &state.sessions.uploads;

    tracing::debug!("Callback {:?} from user {} on {}", action, owner, prompt);

    match action {
        CallbackAction::RightsConfirm => match uploads.confirm_rights(owner, prompt) {
            Some(upload) => {
                let kind = state.orchestrator.validator().media_kind(&upload.file.file_name);
                let Some(kind) = kind else {
                    uploads.remove(owner, prompt);
                    return edit(&bot, chat_id, message_id, messages::SESSION_EXPIRED, None).await;
                };
                edit(
                    &bot,
                    chat_id,
                    message_id,
                    messages::rights_confirmed(&upload.file.file_name),
                    Some(keyboards::actions(kind)),
                )
                .await
            }
            None => edit(&bot, chat_id, message_id, messages::SESSION_EXPIRED, None).await,
        },
        CallbackAction::RightsCancel => {
            uploads.remove(owner, prompt);
            edit(&bot, chat_id, message_id, messages::rights_cancelled(), None).await
        }
        CallbackAction::Cancel => {
            uploads.remove(owner, prompt);
            edit(&bot, chat_id, message_id, messages::action_cancelled(), None).await
        }
        CallbackAction::ExtractAudio | CallbackAction::ConvertToMp3 | CallbackAction::AudioQuality => {
            let Some(upload) = uploads
                .get_for_prompt(owner, prompt)
                .filter(|u| u.rights_confirmed)
            else {
                return edit(&bot, chat_id, message_id, messages::SESSION_EXPIRED, None).await;
            };
            let target = audio_target(action, &upload.file.file_name);
            if uploads.set_awaiting(owner, prompt, Some(target)).is_none() {
                return edit(&bot, chat_id, message_id, messages::SESSION_EXPIRED, None).await;
            }
            edit(
                &bot,
                chat_id,
                message_id,
                messages::audio_quality_prompt(),
                Some(keyboards::audio_quality()),
            )
            .await
        }
        CallbackAction::VideoQuality => {
            if uploads
                .get_for_prompt(owner, prompt)
                .filter(|u| u.rights_confirmed)
                .is_none()
            {
                return edit(&bot, chat_id, message_id, messages::SESSION_EXPIRED, None).await;
            }
            edit(
                &bot,
                chat_id,
                message_id,
                messages::video_quality_prompt(),
                Some(keyboards::video_quality()),
            )
            .await
        }
        CallbackAction::Metadata => {
            start_job(bot, state, owner, chat_id, message_id, |_| JobAction::Metadata).await
        }
        CallbackAction::Save => {
            start_job(bot, state, owner, chat_id, message_id, |_| JobAction::Save).await
        }
        CallbackAction::ConvertToMp4 => {
            start_job(bot, state, owner, chat_id, message_id, |_| {
                JobAction::Convert(ConversionRequest::to_mp4())
            })
            .await
        }
        CallbackAction::PickVideo(resolution) => {
            start_job(bot, state, owner, chat_id, message_id, |_| {
                JobAction::Convert(ConversionRequest::change_resolution(resolution))
            })
            .await
        }
        CallbackAction::PickAudio(bitrate) => {
            start_job(bot, state, owner, chat_id, message_id, |awaiting| {
                let request = match awaiting {
                    Some(AudioTarget {
                        kind: TargetKind::FormatConvert,
                        format,
                    }) => ConversionRequest::convert_audio(format, bitrate),
                    _ => ConversionRequest::extract_audio(bitrate),
                };
                JobAction::Convert(request)
            })
            .await
        }
        CallbackAction::DownloadCancel => {
            state.sessions.links.remove(owner, prompt);
            edit(&bot, chat_id, message_id, messages::download_cancelled(), None).await
        }
        CallbackAction::DownloadVideo(resolution) => {
            start_download(bot, state, owner, chat_id, message_id, DownloadTarget::Video(resolution))
                .await
        }
        CallbackAction::DownloadAudio => {
            start_download(bot, state, owner, chat_id, message_id, DownloadTarget::Audio).await
        }
    }
}

fn audio_target(action: CallbackAction, file_name: &str) -> AudioTarget {
    match action {
        CallbackAction::ExtractAudio => AudioTarget {
            kind: TargetKind::AudioExtract,
            format: OutputFormat::Mp3,
        },
        CallbackAction::AudioQuality => AudioTarget {
            kind: TargetKind::FormatConvert,
            format: OutputFormat::from_extension(&file_extension(file_name))
                .filter(|f| !f.is_video())
                .unwrap_or(OutputFormat::Mp3),
        },
        _ => AudioTarget {
            kind: TargetKind::FormatConvert,
            format: OutputFormat::Mp3,
        },
    }
}

/// Hands the pending upload to the orchestrator on a separate task
async fn start_job<F>(
    bot: Bot,
    state: BotState,
    owner: OwnerId,
    chat_id: ChatId,
    message_id: MessageId,
    choose: F,
) -> HandlerResult
where
    F: FnOnce(Option<AudioTarget>) -> JobAction,
{
    let uploads = &state.sessions.uploads;
    // Unconfirmed uploads stay pending; only a confirmed one is consumed
    let confirmed = uploads
        .get_for_prompt(owner, message_id.0)
        .is_some_and(|u| u.rights_confirmed);
    let upload = if confirmed {
        uploads.take(owner, message_id.0)
    } else {
        None
    };
    let Some(upload) = upload else {
        return edit(&bot, chat_id, message_id, messages::SESSION_EXPIRED, None).await;
    };

    let request = JobRequest {
        owner,
        chat_id: chat_id.0,
        action: choose(upload.awaiting),
        source: JobSource::Telegram(upload.file),
    };

    edit(&bot, chat_id, message_id, messages::processing(), None).await?;
    spawn_job(bot, state, chat_id, message_id, request);
    Ok(())
}

/// Hands the pending link to the orchestrator on a separate task
async fn start_download(
    bot: Bot,
    state: BotState,
    owner: OwnerId,
    chat_id: ChatId,
    message_id: MessageId,
    target: DownloadTarget,
) -> HandlerResult {
    let Some(link) = state.sessions.links.take(owner, message_id.0) else {
        return edit(&bot, chat_id, message_id, messages::LINK_EXPIRED, None).await;
    };

    let text = messages::downloading(target, &link.info.title);
    let request = JobRequest {
        owner,
        chat_id: chat_id.0,
        action: JobAction::Download(target),
        source: JobSource::Url(link.url),
    };

    edit(&bot, chat_id, message_id, text, None).await?;
    spawn_job(bot, state, chat_id, message_id, request);
    Ok(())
}

fn spawn_job(bot: Bot, state: BotState, chat_id: ChatId, message_id: MessageId, request: JobRequest) {
    tokio::spawn(async move {
        let text = match state
            .orchestrator
            .submit(state.gateway.as_ref(), request)
            .await
        {
            Ok(report) => messages::job_finished(&report),
            Err(e) => messages::upload_rejected(&e, &[]),
        };

        if let Err(e) = edit(&bot, chat_id, message_id, text, None).await {
            tracing::warn!("Could not update status message: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_actions() {
        assert_eq!(
            CallbackAction::parse("rights_confirm"),
            Some(CallbackAction::RightsConfirm)
        );
        assert_eq!(
            CallbackAction::parse("quality_audio_high"),
            Some(CallbackAction::PickAudio(AudioBitrate::Kbps320))
        );
        assert_eq!(
            CallbackAction::parse("quality_video_480p"),
            Some(CallbackAction::PickVideo(VideoResolution::P480))
        );
        assert_eq!(
            CallbackAction::parse("dl_video_360p"),
            Some(CallbackAction::DownloadVideo(DownloadResolution::P360))
        );
        assert_eq!(CallbackAction::parse("dl_audio"), Some(CallbackAction::DownloadAudio));
    }

    #[test]
    fn test_audio_target_follows_source_format() {
        assert_eq!(
            audio_target(CallbackAction::AudioQuality, "song.flac").format,
            OutputFormat::Flac
        );
        assert_eq!(
            audio_target(CallbackAction::AudioQuality, "clip.mp4").format,
            OutputFormat::Mp3
        );
        assert_eq!(
            audio_target(CallbackAction::ExtractAudio, "clip.mkv").kind,
            TargetKind::AudioExtract
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(CallbackAction::parse(""), None);
        assert_eq!(CallbackAction::parse("quality_audio_ultra"), None);
        assert_eq!(CallbackAction::parse("quality_video_4k"), None);
        assert_eq!(CallbackAction::parse("dl_video_144p"), None);
        assert_eq!(CallbackAction::parse("drop_tables"), None);
    }

    #[test]
    fn test_data_fits_telegram_limit() {
        let all = [
            CallbackAction::RightsConfirm,
            CallbackAction::RightsCancel,
            CallbackAction::Cancel,
            CallbackAction::Metadata,
            CallbackAction::Save,
            CallbackAction::ExtractAudio,
            CallbackAction::ConvertToMp3,
            CallbackAction::ConvertToMp4,
            CallbackAction::VideoQuality,
            CallbackAction::AudioQuality,
            CallbackAction::PickAudio(AudioBitrate::Kbps192),
            CallbackAction::PickVideo(VideoResolution::P1080),
            CallbackAction::DownloadVideo(DownloadResolution::P720),
            CallbackAction::DownloadAudio,
            CallbackAction::DownloadCancel,
        ];
        for action in all {
            let data = action.as_data();
            assert!(data.len() <= 64);
            assert_eq!(CallbackAction::parse(&data), Some(action));
        }
    }
}
