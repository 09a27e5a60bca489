use crate::config::BotConfig;
use crate::services::converter::{Converter, FfmpegConverter};
use crate::services::downloader::{CookieSource, UrlDownloader, YtDlpDownloader};
use crate::services::extractor::{FfprobeExtractor, MetadataReader};
use crate::services::tool::run_tool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// External tools behind their service traits
pub struct Toolchain {
    pub converter: Arc<dyn Converter>,
    pub metadata_reader: Arc<dyn MetadataReader>,
    pub downloader: Arc<dyn UrlDownloader>,
}

/// Returns the first line the tool prints for `version_flag`, or None if it cannot run
pub async fn health_check(program: &Path, version_flag: &str) -> Option<String> {
    let output = run_tool(program, &[version_flag], HEALTH_CHECK_TIMEOUT)
        .await
        .ok()?;
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
}

pub async fn setup_toolchain(config: &BotConfig) -> Toolchain {
    for program in [&config.ffmpeg_path, &config.ffprobe_path] {
        match health_check(program, "-version").await {
            Some(version) => info!("🎞️  {}", version),
            None => tracing::warn!(
                "⚠️  {} is not available! Conversions and metadata requests will fail.",
                program.display()
            ),
        }
    }

    match health_check(&config.ytdlp_path, "--version").await {
        Some(version) => info!("⬇️  yt-dlp {}", version),
        None => tracing::warn!(
            "⚠️  {} is not available! Link downloads will fail.",
            config.ytdlp_path.display()
        ),
    }
    match CookieSource::from_config(config) {
        CookieSource::File(path) => info!("🍪 Using cookie file {}", path.display()),
        CookieSource::Browser(browser) => info!("🍪 Using cookies from {}", browser),
        CookieSource::None => {}
    }

    info!(
        "⏱️  Tool timeout: {}s",
        config.conversion_timeout.as_secs()
    );

    Toolchain {
        converter: Arc::new(FfmpegConverter::from_config(config)),
        metadata_reader: Arc::new(FfprobeExtractor::from_config(config)),
        downloader: Arc::new(YtDlpDownloader::from_config(config)),
    }
}
