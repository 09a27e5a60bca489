use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::bot::callbacks::CallbackAction;
use crate::models::{AudioBitrate, DownloadResolution, MediaKind, VideoResolution};

fn button(text: impl Into<String>, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.as_data())
}

fn cancel_row() -> Vec<InlineKeyboardButton> {
    vec![button("❌ Cancel", CallbackAction::Cancel)]
}

pub fn rights() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("✅ I confirm", CallbackAction::RightsConfirm),
        button("❌ Cancel", CallbackAction::RightsCancel),
    ]])
}

/// Action menu shown after the rights confirmation
pub fn actions(kind: MediaKind) -> InlineKeyboardMarkup {
    let mut rows = vec![vec![button("📊 Get Metadata", CallbackAction::Metadata)]];

    match kind {
        MediaKind::Video => {
            rows.push(vec![button("🎵 Extract Audio", CallbackAction::ExtractAudio)]);
            rows.push(vec![button("🔄 Convert to MP3", CallbackAction::ConvertToMp3)]);
            rows.push(vec![button("🎬 Convert to MP4", CallbackAction::ConvertToMp4)]);
            rows.push(vec![button("📐 Change Quality", CallbackAction::VideoQuality)]);
        }
        MediaKind::Audio => {
            rows.push(vec![button("🔄 Convert to MP3", CallbackAction::ConvertToMp3)]);
            rows.push(vec![button("🎚️ Change Quality", CallbackAction::AudioQuality)]);
        }
    }

    rows.push(vec![
        button("💾 Save to Storage", CallbackAction::Save),
        button("❌ Cancel", CallbackAction::Cancel),
    ]);

    InlineKeyboardMarkup::new(rows)
}

pub fn audio_quality() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = AudioBitrate::ALL
        .iter()
        .map(|b| {
            vec![button(
                format!("🎵 {}", b.label()),
                CallbackAction::PickAudio(*b),
            )]
        })
        .collect();
    rows.push(cancel_row());
    InlineKeyboardMarkup::new(rows)
}

pub fn video_quality() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = VideoResolution::ALL
        .iter()
        .map(|r| {
            vec![button(
                format!("📐 {}", r.label()),
                CallbackAction::PickVideo(*r),
            )]
        })
        .collect();
    rows.push(cancel_row());
    InlineKeyboardMarkup::new(rows)
}

/// Format menu under a link's info card
pub fn download_options() -> InlineKeyboardMarkup {
    let video = |r: DownloadResolution| {
        let icon = if r.max_height() >= 720 { "🎬" } else { "📱" };
        button(
            format!("{} Video ({})", icon, r.key()),
            CallbackAction::DownloadVideo(r),
        )
    };

    InlineKeyboardMarkup::new(vec![
        vec![video(DownloadResolution::P720), video(DownloadResolution::P1080)],
        vec![video(DownloadResolution::P480), video(DownloadResolution::P360)],
        vec![button("🎵 Audio Only (MP3)", CallbackAction::DownloadAudio)],
        vec![button("❌ Cancel", CallbackAction::DownloadCancel)],
    ])
}
