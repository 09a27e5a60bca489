use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::utils::validation::fit_file_name;

/// Telegram user that owns files and jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
}

/// A file kept in a user's permanent storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub owner: OwnerId,
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// A file announced by Telegram, not downloaded yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFile {
    pub file_id: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioBitrate {
    Kbps128,
    #[default]
    Kbps192,
    Kbps320,
}

impl AudioBitrate {
    pub const ALL: [AudioBitrate; 3] = [Self::Kbps128, Self::Kbps192, Self::Kbps320];

    /// Value passed to ffmpeg's -b:a
    pub fn ffmpeg_value(&self) -> &'static str {
        match self {
            Self::Kbps128 => "128k",
            Self::Kbps192 => "192k",
            Self::Kbps320 => "320k",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Kbps128 => "low",
            Self::Kbps192 => "medium",
            Self::Kbps320 => "high",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.key() == key)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Kbps128 => "128 kbps (Low)",
            Self::Kbps192 => "192 kbps (Medium)",
            Self::Kbps320 => "320 kbps (High)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoResolution {
    P480,
    P720,
    P1080,
}

impl VideoResolution {
    pub const ALL: [VideoResolution; 3] = [Self::P480, Self::P720, Self::P1080];

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::P480 => (854, 480),
            Self::P720 => (1280, 720),
            Self::P1080 => (1920, 1080),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.key() == key)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::P480 => "480p (SD)",
            Self::P720 => "720p (HD)",
            Self::P1080 => "1080p (Full HD)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Audio(AudioBitrate),
    Video(VideoResolution),
}

impl Quality {
    pub fn label(&self) -> &'static str {
        match self {
            Quality::Audio(b) => b.label(),
            Quality::Video(r) => r.label(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    AudioExtract,
    FormatConvert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Mp3,
    Aac,
    Ogg,
    Flac,
    Wav,
    Mp4,
}

impl OutputFormat {
    /// Target that keeps a file's own container (`.m4a` is re-encoded as `.aac`)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "aac" | "m4a" => Some(Self::Aac),
            "ogg" => Some(Self::Ogg),
            "flac" => Some(Self::Flac),
            "wav" => Some(Self::Wav),
            "mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Mp4 => "mp4",
        }
    }

    /// ffmpeg audio encoder for audio-only targets
    pub fn audio_codec(&self) -> &'static str {
        match self {
            Self::Mp3 => "libmp3lame",
            Self::Aac | Self::Mp4 => "aac",
            Self::Ogg => "libvorbis",
            Self::Flac => "flac",
            Self::Wav => "pcm_s16le",
        }
    }

    /// Lossless targets ignore the bitrate setting
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Flac | Self::Wav)
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Mp4)
    }
}

/// What the external tool should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub kind: TargetKind,
    pub format: OutputFormat,
    pub quality: Option<Quality>,
}

impl ConversionRequest {
    /// Pull the audio track out of a video as MP3
    pub fn extract_audio(bitrate: AudioBitrate) -> Self {
        Self {
            kind: TargetKind::AudioExtract,
            format: OutputFormat::Mp3,
            quality: Some(Quality::Audio(bitrate)),
        }
    }

    pub fn convert_audio(format: OutputFormat, bitrate: AudioBitrate) -> Self {
        Self {
            kind: TargetKind::FormatConvert,
            format,
            quality: Some(Quality::Audio(bitrate)),
        }
    }

    pub fn change_resolution(resolution: VideoResolution) -> Self {
        Self {
            kind: TargetKind::FormatConvert,
            format: OutputFormat::Mp4,
            quality: Some(Quality::Video(resolution)),
        }
    }

    pub fn to_mp4() -> Self {
        Self {
            kind: TargetKind::FormatConvert,
            format: OutputFormat::Mp4,
            quality: None,
        }
    }

    /// Name the delivered file gets, derived from the uploaded one
    pub fn output_file_name(&self, source_name: &str) -> String {
        let stem = Path::new(source_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("output");

        let tail = match self.quality {
            Some(Quality::Video(resolution)) => {
                format!("_{}.{}", resolution.key(), self.format.extension())
            }
            _ => format!(".{}", self.format.extension()),
        };
        fit_file_name(stem, &tail)
    }
}

/// Height cap for a video fetched from a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DownloadResolution {
    P360,
    P480,
    P720,
    P1080,
}

impl DownloadResolution {
    pub const ALL: [DownloadResolution; 4] = [Self::P720, Self::P1080, Self::P480, Self::P360];

    pub fn max_height(&self) -> u32 {
        match self {
            Self::P360 => 360,
            Self::P480 => 480,
            Self::P720 => 720,
            Self::P1080 => 1080,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::P360 => "360p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.key() == key)
    }
}

/// What to fetch from a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadTarget {
    Video(DownloadResolution),
    /// Best audio track, re-encoded as MP3
    Audio,
}

impl DownloadTarget {
    pub fn label(&self) -> String {
        match self {
            DownloadTarget::Video(resolution) => format!("Video ({})", resolution.key()),
            DownloadTarget::Audio => "MP3 Audio".to_string(),
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        match self {
            DownloadTarget::Video(_) => MediaKind::Video,
            DownloadTarget::Audio => MediaKind::Audio,
        }
    }

    /// Container the downloader is asked to produce
    pub fn extension(&self) -> &'static str {
        match self {
            DownloadTarget::Video(_) => "mp4",
            DownloadTarget::Audio => "mp3",
        }
    }
}

/// Where a job's input comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    Telegram(IncomingFile),
    Url(String),
}

/// What a job does with the downloaded source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobAction {
    Convert(ConversionRequest),
    Metadata,
    Save,
    Download(DownloadTarget),
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobAction::Convert(req) => match req.kind {
                TargetKind::AudioExtract => write!(f, "extract-audio:{}", req.format.extension()),
                TargetKind::FormatConvert => write!(f, "convert:{}", req.format.extension()),
            },
            JobAction::Metadata => write!(f, "metadata"),
            JobAction::Save => write!(f, "save"),
            JobAction::Download(DownloadTarget::Video(r)) => write!(f, "download:{}", r.key()),
            JobAction::Download(DownloadTarget::Audio) => write!(f, "download:audio"),
        }
    }
}

/// Lifecycle of one job. Delivered and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Received,
    Validated,
    Downloaded,
    Converted,
    Delivered,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Delivered | JobState::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Received, Validated)
            | (Validated, Downloaded)
            | (Downloaded, Converted)
            | (Converted, Delivered) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One conversion/extraction request. Lives only for the duration of the job.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: Uuid,
    pub owner: OwnerId,
    pub source_name: String,
    pub source_path: Option<PathBuf>,
    pub action: JobAction,
    pub created_at: DateTime<Utc>,
    state: JobState,
}

impl ConversionJob {
    pub fn new(owner: OwnerId, source_name: impl Into<String>, action: JobAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            source_name: source_name.into(),
            source_path: None,
            action,
            created_at: Utc::now(),
            state: JobState::Received,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn status(&self) -> JobStatus {
        match self.state {
            JobState::Received => JobStatus::Pending,
            JobState::Validated | JobState::Downloaded | JobState::Converted => JobStatus::Running,
            JobState::Delivered => JobStatus::Succeeded,
            JobState::Failed => JobStatus::Failed,
        }
    }

    /// Moves the job forward; illegal transitions are refused and logged.
    pub fn advance(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                "Job {} refused transition {:?} -> {:?}",
                self.id,
                self.state,
                next
            );
            return false;
        }
        tracing::debug!("Job {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
        true
    }

    pub fn fail(&mut self) -> bool {
        self.advance(JobState::Failed)
    }
}
