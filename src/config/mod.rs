use std::env;
use std::path::PathBuf;
use std::time::Duration;

const MB: u64 = 1024 * 1024;

/// Default video container allow-list
pub const DEFAULT_VIDEO_FORMATS: &[&str] = &[".mp4", ".avi", ".mkv", ".mov", ".webm", ".flv"];

/// Default audio container allow-list
pub const DEFAULT_AUDIO_FORMATS: &[&str] = &[".mp3", ".wav", ".aac", ".flac", ".ogg", ".m4a"];

/// Runtime configuration for the media bot
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot token (required for the bot mode)
    pub bot_token: String,

    /// Talk to a self-hosted Bot API server instead of api.telegram.org (default: false)
    pub use_local_api: bool,

    /// Base URL of the local Bot API server (default: "http://localhost:8081")
    pub local_api_url: String,

    /// Maximum accepted upload size in bytes (default: 50 MB, or 2000 MB with a local API)
    pub max_file_size: u64,

    /// Maximum size of a file the bot may send back (default: 50 MB, or 2000 MB with a local API)
    pub delivery_limit: u64,

    /// Root of the per-user permanent storage (default: "storage")
    pub storage_dir: PathBuf,

    /// Root of the per-job working directories (default: "temp")
    pub temp_dir: PathBuf,

    /// ffmpeg binary (default: "ffmpeg")
    pub ffmpeg_path: PathBuf,

    /// ffprobe binary (default: "ffprobe")
    pub ffprobe_path: PathBuf,

    /// yt-dlp binary used for link downloads (default: "yt-dlp")
    pub ytdlp_path: PathBuf,

    /// Netscape cookie file handed to yt-dlp, preferred over browser cookies
    pub cookies_file: Option<PathBuf>,

    /// Browser yt-dlp reads cookies from, e.g. "firefox"
    pub cookies_from_browser: Option<String>,

    /// Hard limit for a single external tool run (default: 600 s)
    pub conversion_timeout: Duration,

    /// Temp files older than this are removed by the sweeper (default: 1 h)
    pub temp_max_age: Duration,

    /// Interval between background sweeps (default: 900 s)
    pub cleanup_interval: Duration,

    /// Pending uploads without an action are dropped after this (default: 3600 s)
    pub pending_ttl: Duration,

    /// Random overwrite passes before unlinking a file, 0 disables (default: 3)
    pub secure_delete_passes: u32,

    /// Jobs allowed to run at the same time (default: 4)
    pub max_concurrent_jobs: usize,

    /// Accepted video extensions, lower case with leading dot
    pub video_formats: Vec<String>,

    /// Accepted audio extensions, lower case with leading dot
    pub audio_formats: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            use_local_api: false,
            local_api_url: "http://localhost:8081".to_string(),
            max_file_size: 50 * MB,
            delivery_limit: 50 * MB,
            storage_dir: PathBuf::from("storage"),
            temp_dir: PathBuf::from("temp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            ytdlp_path: PathBuf::from("yt-dlp"),
            cookies_file: None,
            cookies_from_browser: None,
            conversion_timeout: Duration::from_secs(600),
            temp_max_age: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(900),
            pending_ttl: Duration::from_secs(3600),
            secure_delete_passes: 3,
            max_concurrent_jobs: 4,
            video_formats: to_owned_list(DEFAULT_VIDEO_FORMATS),
            audio_formats: to_owned_list(DEFAULT_AUDIO_FORMATS),
        }
    }
}

impl BotConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let use_local_api = env::var("USE_LOCAL_API")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(default.use_local_api);

        // The local Bot API server lifts Telegram's 50 MB cap to 2 GB
        let size_default_mb = if use_local_api { 2000 } else { 50 };

        Self {
            bot_token: env::var("TELEGRAM_BOT_TOKEN").unwrap_or(default.bot_token),

            use_local_api,

            local_api_url: env::var("LOCAL_API_URL").unwrap_or(default.local_api_url),

            max_file_size: megabytes(parse_var("MAX_FILE_SIZE_MB").unwrap_or(size_default_mb)),

            delivery_limit: megabytes(parse_var("DELIVERY_LIMIT_MB").unwrap_or(size_default_mb)),

            storage_dir: env::var("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.storage_dir),

            temp_dir: env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.temp_dir),

            ffmpeg_path: env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.ffmpeg_path),

            ffprobe_path: env::var("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.ffprobe_path),

            ytdlp_path: env::var("YTDLP_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.ytdlp_path),

            cookies_file: non_empty_var("COOKIES_FILE").map(PathBuf::from),

            cookies_from_browser: non_empty_var("COOKIES_FROM_BROWSER"),

            conversion_timeout: parse_var("CONVERSION_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.conversion_timeout),

            temp_max_age: parse_var::<u64>("TEMP_MAX_AGE_HOURS")
                .map(hours)
                .unwrap_or(default.temp_max_age),

            cleanup_interval: parse_var("CLEANUP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.cleanup_interval),

            pending_ttl: parse_var("PENDING_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.pending_ttl),

            secure_delete_passes: parse_var("SECURE_DELETE_PASSES")
                .unwrap_or(default.secure_delete_passes),

            max_concurrent_jobs: parse_var::<usize>("MAX_CONCURRENT_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(default.max_concurrent_jobs),

            video_formats: env::var("SUPPORTED_VIDEO_FORMATS")
                .map(|v| parse_format_list(&v))
                .unwrap_or(default.video_formats),

            audio_formats: env::var("SUPPORTED_AUDIO_FORMATS")
                .map(|v| parse_format_list(&v))
                .unwrap_or(default.audio_formats),
        }
    }

    /// Create config for development and tests (no overwrite passes, short timeouts)
    pub fn development() -> Self {
        Self {
            secure_delete_passes: 0,
            conversion_timeout: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Every accepted extension, video first
    pub fn supported_formats(&self) -> Vec<&str> {
        self.video_formats
            .iter()
            .chain(self.audio_formats.iter())
            .map(String::as_str)
            .collect()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Absurd values clamp instead of overflowing
fn megabytes(n: u64) -> u64 {
    n.saturating_mul(MB)
}

fn hours(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(3600))
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Parses "mp4, .MKV,webm" into [".mp4", ".mkv", ".webm"]
pub fn parse_format_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .map(|s| format!(".{}", s))
        .collect()
}
