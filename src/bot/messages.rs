//! User-facing texts. Everything here is Telegram HTML.

use teloxide::utils::html::escape;

use crate::error::MediaError;
use crate::models::{DownloadTarget, JobAction, StoredFile};
use crate::services::downloader::{RemoteMediaInfo, platform_emoji};
use crate::services::orchestrator::{JobOutput, JobReport};
use crate::utils::format::{format_duration, format_file_size, format_views};

/// Characters of a remote title shown in prompts
const TITLE_CHARS: usize = 100;

pub const COPYRIGHT_REMINDER: &str = "⚠️ <b>Important Reminder:</b>\n\
This bot is for processing files you <b>own</b> or have <b>explicit permission</b> to use.\n\
Do not use this bot to share copyrighted content without authorization.\n\
By using this bot, you confirm that you have the necessary rights to the content.";

pub const SESSION_EXPIRED: &str = "❌ Session expired. Please upload the file again.";

pub const LINK_EXPIRED: &str = "❌ Session expired. Please send the URL again.";

pub const UPLOAD_HINT: &str =
    "📤 Send me a video or audio file or a video link to get started, or use /help to see what I can do.";

pub const LINK_NOT_PARSED: &str = "🔗 I detected a possible URL, but couldn't parse it.\n\n\
Please send a valid link from:\n\
• YouTube (videos &amp; shorts)\n\
• Instagram (posts &amp; reels)\n\
• TikTok\n\
• Twitter/X\n\
• Facebook\n\
• And more!";

fn short_title(title: &str) -> String {
    escape(&title.chars().take(TITLE_CHARS).collect::<String>())
}

pub fn welcome() -> String {
    format!(
        "🎬 <b>Welcome to Media Bot!</b>\n\n\
         <b>📤 Upload a file</b> to:\n\
         • 📊 Extract metadata\n\
         • 🎵 Extract audio (MP3)\n\
         • 🔄 Convert formats\n\
         • 💾 Keep it in your storage\n\n\
         <b>🔗 Send a link</b> from YouTube, Instagram, TikTok and more to download it\n\n\
         <b>Commands:</b>\n\
         /start - Show this message\n\
         /help - Detailed help\n\
         /files - Your stored files\n\n\
         {}",
        COPYRIGHT_REMINDER
    )
}

fn format_names(formats: &[String]) -> String {
    formats
        .iter()
        .map(|f| f.trim_start_matches('.').to_uppercase())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn help(video_formats: &[String], audio_formats: &[String], max_file_size: u64) -> String {
    format!(
        "📖 <b>Media Bot Help</b>\n\n\
         <b>How to use:</b>\n\n\
         1️⃣ <b>Upload a media file</b>\n\
         \u{20}  Send any video or audio file (up to {})\n\n\
         2️⃣ <b>Confirm your rights</b>\n\
         \u{20}  You'll be asked to confirm you own the content or have permission\n\n\
         3️⃣ <b>Choose an action:</b>\n\
         \u{20}  • 📊 <b>Metadata</b> - View file information (duration, codec, etc.)\n\
         \u{20}  • 🎵 <b>Extract Audio</b> - Get audio from video as MP3\n\
         \u{20}  • 🔄 <b>Convert</b> - Change format or quality\n\
         \u{20}  • 💾 <b>Save</b> - Store file for later\n\n\
         4️⃣ <b>Select quality</b> (for conversions)\n\
         \u{20}  Audio: 128kbps / 192kbps / 320kbps\n\
         \u{20}  Video: 480p / 720p / 1080p\n\n\
         <b>Downloads:</b>\n\
         \u{20}  Send a video link and pick a quality or MP3 audio\n\n\
         <b>File Management:</b>\n\
         /files - List your saved files\n\
         /delete <code>filename</code> - Delete a specific file\n\
         /clear - Remove all saved files\n\n\
         <b>Supported Formats:</b>\n\
         🎬 Video: {}\n\
         🎵 Audio: {}\n\n\
         {}",
        format_file_size(max_file_size),
        format_names(video_formats),
        format_names(audio_formats),
        COPYRIGHT_REMINDER
    )
}

/// Upload rejected before any job exists
pub fn upload_rejected(error: &MediaError, supported: &[&str]) -> String {
    match error {
        MediaError::UnsupportedFormat { .. } => format!(
            "{}\n\nSupported formats: {}",
            escape(&error.user_message()),
            supported.join(", ")
        ),
        _ => escape(&error.user_message()),
    }
}

pub fn rights_prompt(file_name: &str, size: u64) -> String {
    format!(
        "📁 <b>File received:</b> <code>{}</code>\n\
         📊 <b>Size:</b> {}\n\n\
         ⚠️ <b>Rights Confirmation Required</b>\n\n\
         Before processing, please confirm that:\n\
         • You own this content, OR\n\
         • You have explicit permission to use it\n\n\
         Do you confirm you have the rights to this content?",
        escape(file_name),
        format_file_size(size)
    )
}

pub fn rights_confirmed(file_name: &str) -> String {
    format!(
        "✅ <b>Rights confirmed!</b>\n\n📁 <b>File:</b> <code>{}</code>\n\nWhat would you like to do?",
        escape(file_name)
    )
}

pub fn rights_cancelled() -> String {
    format!("❌ <b>Operation cancelled.</b>\n\n{}", COPYRIGHT_REMINDER)
}

pub fn action_cancelled() -> &'static str {
    "✅ <b>Operation cancelled.</b>\n\nSend another file when you're ready!"
}

pub fn audio_quality_prompt() -> &'static str {
    "🎚️ <b>Select Audio Quality:</b>\n\nHigher quality = larger file size"
}

pub fn video_quality_prompt() -> &'static str {
    "📐 <b>Select Video Quality:</b>\n\nHigher resolution = larger file size"
}

pub fn processing() -> &'static str {
    "⏳ <b>Processing...</b>\nThis may take a moment."
}

pub fn fetching_info() -> &'static str {
    "⏳ <b>Fetching video info...</b>"
}

/// Info card for a link, shown above the format menu
pub fn link_found(info: &RemoteMediaInfo) -> String {
    format!(
        "{} <b>{}</b> Video Found!\n\n\
         📝 <b>Title:</b> {}\n\
         👤 <b>Uploader:</b> {}\n\
         ⏱️ <b>Duration:</b> {}\n\
         👁️ <b>Views:</b> {}\n\n\
         ⚠️ <b>Reminder:</b> Only download content you have rights to use.\n\n\
         Select download format:",
        platform_emoji(&info.platform),
        escape(&info.platform),
        short_title(&info.title),
        escape(&info.uploader),
        format_duration(info.duration_secs),
        format_views(info.view_count)
    )
}

pub fn downloading(target: DownloadTarget, title: &str) -> String {
    format!(
        "⬇️ <b>Downloading {}...</b>\n\n📝 {}\n\nThis may take a moment...",
        target.label(),
        short_title(title)
    )
}

pub fn download_cancelled() -> &'static str {
    "✅ Download cancelled."
}

pub fn job_finished(report: &JobReport) -> String {
    match &report.outcome {
        Ok(JobOutput::Delivered { file_name, size })
            if matches!(report.job.action, JobAction::Download(_)) =>
        {
            format!(
                "✅ <b>Download complete!</b>\n\n📁 <code>{}</code> ({})\n\nSend another URL to download more!",
                escape(file_name),
                format_file_size(*size)
            )
        }
        Ok(JobOutput::Delivered { file_name, size }) => format!(
            "✅ <b>Conversion complete!</b>\n\n📁 <code>{}</code> ({})\n\nSend another file when ready.",
            escape(file_name),
            format_file_size(*size)
        ),
        Ok(JobOutput::Metadata(_)) => {
            "✅ <b>Metadata sent.</b>\n\nSend another file when ready.".to_string()
        }
        Ok(JobOutput::Saved(stored)) => format!(
            "✅ <b>File saved!</b>\n\n📁 Filename: <code>{}</code>\n\nUse /files to see your stored files.",
            escape(&stored.file_name)
        ),
        Err(MediaError::FileTooLarge { .. }) => {
            "❌ <b>Output file too large!</b>\n\nTry a lower quality setting.".to_string()
        }
        Err(_) => "❌ <b>Processing failed.</b>\n\nSend another file when ready.".to_string(),
    }
}

pub fn file_list(files: &[StoredFile], total_size: u64) -> String {
    if files.is_empty() {
        return "📁 <b>Your Storage</b>\n\n\
                You don't have any stored files yet.\n\n\
                Upload a file and select 💾 <b>Save to Storage</b> to store it."
            .to_string();
    }

    let lines: Vec<String> = files
        .iter()
        .enumerate()
        .map(|(i, f)| {
            format!(
                "{}. <code>{}</code> ({})",
                i + 1,
                escape(&f.file_name),
                format_file_size(f.size)
            )
        })
        .collect();

    format!(
        "📁 <b>Your Storage</b> ({} files)\n💾 Total size: {}\n\n{}\n\n\
         <b>Commands:</b>\n\
         /delete <code>filename</code> - Delete a specific file\n\
         /clear - Delete all files",
        files.len(),
        format_file_size(total_size),
        lines.join("\n")
    )
}

pub fn delete_usage() -> &'static str {
    "❌ <b>Please specify a filename.</b>\n\n\
     Usage: <code>/delete filename.mp3</code>\n\n\
     Use /files to see your stored files."
}

pub fn file_deleted(file_name: &str) -> String {
    format!("✅ <b>File deleted:</b> <code>{}</code>", escape(file_name))
}

pub fn storage_cleared(count: usize) -> String {
    if count == 0 {
        return "📁 <b>Your storage is already empty.</b>".to_string();
    }
    format!("🗑️ <b>Storage cleared!</b>\n\nDeleted {} file(s).", count)
}
