use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::config::BotConfig;
use crate::error::MediaError;
use crate::models::DownloadTarget;
use crate::services::tool::run_tool;

/// Hosts whose links are offered for download, subdomains included
pub const SUPPORTED_DOMAINS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "instagram.com",
    "instagr.am",
    "tiktok.com",
    "twitter.com",
    "x.com",
    "facebook.com",
    "fb.watch",
    "vimeo.com",
    "dailymotion.com",
    "twitch.tv",
    "reddit.com",
    "soundcloud.com",
];

/// Fixed stem of the downloaded file; yt-dlp fills in the extension
const OUTPUT_STEM: &str = "download";

/// What the link points at, shown before the user picks a format
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMediaInfo {
    pub title: String,
    pub uploader: String,
    pub duration_secs: f64,
    pub view_count: Option<u64>,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub title: String,
}

/// Fetches media from a web page link.
#[async_trait]
pub trait UrlDownloader: Send + Sync {
    async fn fetch_info(&self, url: &str) -> Result<RemoteMediaInfo, MediaError>;

    /// Downloads into `dest_dir`, which must be a job workspace
    async fn download(
        &self,
        url: &str,
        target: DownloadTarget,
        dest_dir: &Path,
    ) -> Result<DownloadedMedia, MediaError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CookieSource {
    #[default]
    None,
    File(PathBuf),
    Browser(String),
}

impl CookieSource {
    /// A cookie file wins over browser cookies, but only if it exists
    pub fn from_config(config: &BotConfig) -> Self {
        if let Some(file) = config.cookies_file.as_ref().filter(|f| f.is_file()) {
            return CookieSource::File(file.clone());
        }
        match &config.cookies_from_browser {
            Some(browser) => CookieSource::Browser(browser.clone()),
            None => CookieSource::None,
        }
    }

    fn args(&self) -> Vec<String> {
        match self {
            CookieSource::None => Vec::new(),
            CookieSource::File(path) => {
                vec!["--cookies".to_string(), path.to_string_lossy().into_owned()]
            }
            CookieSource::Browser(browser) => {
                vec!["--cookies-from-browser".to_string(), browser.clone()]
            }
        }
    }
}

pub struct YtDlpDownloader {
    ytdlp_path: PathBuf,
    ffmpeg_path: PathBuf,
    timeout: Duration,
    max_file_size: u64,
    cookies: CookieSource,
}

impl YtDlpDownloader {
    pub fn new(
        ytdlp_path: PathBuf,
        ffmpeg_path: PathBuf,
        timeout: Duration,
        max_file_size: u64,
        cookies: CookieSource,
    ) -> Self {
        Self {
            ytdlp_path,
            ffmpeg_path,
            timeout,
            max_file_size,
            cookies,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(
            config.ytdlp_path.clone(),
            config.ffmpeg_path.clone(),
            config.conversion_timeout,
            config.delivery_limit,
            CookieSource::from_config(config),
        )
    }

    fn info_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        args.extend(self.cookies.args());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    /// Command line for a download into `dest_dir/download.<ext>`
    pub fn build_args(&self, url: &str, target: DownloadTarget, dest_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
        ];

        match target {
            DownloadTarget::Video(resolution) => {
                let h = resolution.max_height();
                args.push("-f".to_string());
                args.push(format!(
                    "bestvideo[height<={h}]+bestaudio/best[height<={h}]/best"
                ));
                args.push("--merge-output-format".to_string());
                args.push("mp4".to_string());
            }
            DownloadTarget::Audio => {
                args.push("-f".to_string());
                args.push("bestaudio[ext=m4a]/bestaudio/best".to_string());
                args.push("-x".to_string());
                args.push("--audio-format".to_string());
                args.push("mp3".to_string());
                args.push("--audio-quality".to_string());
                args.push("192K".to_string());
            }
        }

        args.push("--max-filesize".to_string());
        args.push(self.max_file_size.to_string());
        args.push("--ffmpeg-location".to_string());
        args.push(self.ffmpeg_path.to_string_lossy().into_owned());
        args.push("-o".to_string());
        args.push(
            dest_dir
                .join(format!("{}.%(ext)s", OUTPUT_STEM))
                .to_string_lossy()
                .into_owned(),
        );
        // Title is printed once the final file is in place
        args.push("--no-simulate".to_string());
        args.push("--print".to_string());
        args.push("after_move:title".to_string());
        args.extend(self.cookies.args());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl UrlDownloader for YtDlpDownloader {
    async fn fetch_info(&self, url: &str) -> Result<RemoteMediaInfo, MediaError> {
        let output = run_tool(&self.ytdlp_path, &self.info_args(url), self.timeout)
            .await
            .map_err(into_download_error)?;
        parse_info(&output.stdout)
    }

    async fn download(
        &self,
        url: &str,
        target: DownloadTarget,
        dest_dir: &Path,
    ) -> Result<DownloadedMedia, MediaError> {
        tracing::info!("⬇️  Downloading {} as {}", url, target.label());

        let output = run_tool(
            &self.ytdlp_path,
            &self.build_args(url, target, dest_dir),
            self.timeout,
        )
        .await
        .map_err(into_download_error)?;

        let Some(path) = find_output(dest_dir, target).await? else {
            // yt-dlp exits cleanly when --max-filesize skips the download
            return Err(MediaError::DownloadFailed(
                "no file was produced, the media may exceed the size limit".to_string(),
            ));
        };

        let title = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .unwrap_or(OUTPUT_STEM)
            .to_string();

        Ok(DownloadedMedia { path, title })
    }
}

fn into_download_error(error: MediaError) -> MediaError {
    match error {
        MediaError::ConversionFailed(msg) => MediaError::DownloadFailed(msg),
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    extractor_key: Option<String>,
    extractor: Option<String>,
}

fn parse_info(stdout: &[u8]) -> Result<RemoteMediaInfo, MediaError> {
    let info: YtDlpInfo = serde_json::from_slice(stdout).map_err(|e| {
        tracing::warn!("Unreadable yt-dlp info: {}", e);
        MediaError::DownloadFailed("could not read the media information".to_string())
    })?;

    Ok(RemoteMediaInfo {
        title: info.title.unwrap_or_else(|| "Unknown".to_string()),
        uploader: info.uploader.unwrap_or_else(|| "Unknown".to_string()),
        duration_secs: info.duration.unwrap_or(0.0),
        view_count: info.view_count,
        platform: info
            .extractor_key
            .or(info.extractor)
            .unwrap_or_else(|| "Unknown".to_string()),
    })
}

/// Finds the finished file, ignoring partial downloads and fragments
async fn find_output(dir: &Path, target: DownloadTarget) -> Result<Option<PathBuf>, MediaError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut candidates = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(OUTPUT_STEM)
            || name.ends_with(".part")
            || name.ends_with(".ytdl")
            || !entry.file_type().await?.is_file()
        {
            continue;
        }
        candidates.push(path);
    }

    candidates.sort();
    let preferred = candidates
        .iter()
        .position(|p| p.extension().and_then(|e| e.to_str()) == Some(target.extension()));
    Ok(match preferred {
        Some(i) => Some(candidates.swap_remove(i)),
        None => candidates.into_iter().next(),
    })
}

/// Parses `candidate` as an http(s) link to a supported platform
pub fn supported_url(candidate: &str) -> Option<Url> {
    let url = Url::parse(candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();
    let supported = SUPPORTED_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{}", d)));
    supported.then_some(url)
}

/// First supported link in a chat message
pub fn find_supported_url(text: &str) -> Option<Url> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|c| matches!(c, '<' | '>' | '(' | ')' | '"' | '\'')))
        .find_map(supported_url)
}

/// True for text that mentions a link we could not use
pub fn looks_like_link(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["http", "youtube", "instagram", "tiktok"]
        .iter()
        .any(|hint| lower.contains(hint))
}

pub fn platform_emoji(platform: &str) -> &'static str {
    const EMOJIS: &[(&str, &str)] = &[
        ("youtube", "🔴"),
        ("instagram", "📸"),
        ("tiktok", "🎵"),
        ("twitter", "🐦"),
        ("facebook", "📘"),
        ("vimeo", "🎬"),
        ("twitch", "💜"),
        ("reddit", "🤖"),
        ("soundcloud", "🔊"),
    ];
    let lower = platform.to_lowercase();
    EMOJIS
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|(_, emoji)| *emoji)
        .unwrap_or("🎥")
}
