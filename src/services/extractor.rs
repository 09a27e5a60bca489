use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::utils::html;

use crate::config::BotConfig;
use crate::error::MediaError;
use crate::services::tool::run_tool;
use crate::utils::format::{format_bitrate, format_duration, format_file_size, format_frame_rate};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamDetails {
    Video { width: Option<u32>, height: Option<u32>, fps: String },
    Audio { sample_rate: Option<u32>, channels: Option<u32> },
    Other { kind: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub codec: String,
    pub details: StreamDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaMetadata {
    pub file_name: String,
    pub format: String,
    pub duration_secs: f64,
    pub size: u64,
    pub bit_rate: u64,
    pub streams: Vec<StreamInfo>,
}

/// Reads container and stream information from a media file.
#[async_trait]
pub trait MetadataReader: Send + Sync {
    async fn read_metadata(&self, path: &Path) -> Result<MediaMetadata, MediaError>;
}

pub struct FfprobeExtractor {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeExtractor {
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.ffprobe_path.clone(), config.conversion_timeout)
    }
}

#[async_trait]
impl MetadataReader for FfprobeExtractor {
    async fn read_metadata(&self, path: &Path) -> Result<MediaMetadata, MediaError> {
        let args = [
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.to_string_lossy().into_owned(),
        ];

        let output = run_tool(&self.ffprobe_path, &args, self.timeout)
            .await
            .map_err(|e| match e {
                MediaError::ConversionFailed(msg) => MediaError::MetadataFailed(msg),
                other => other,
            })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        parse_ffprobe_output(&file_name, &output.stdout)
    }
}

// ffprobe prints most numbers as JSON strings
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_long_name: Option<String>,
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    codec_long_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

fn parse_number<T: std::str::FromStr>(raw: &Option<String>) -> Option<T> {
    raw.as_deref().and_then(|v| v.trim().parse().ok())
}

/// Parses `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_ffprobe_output(file_name: &str, stdout: &[u8]) -> Result<MediaMetadata, MediaError> {
    let report: FfprobeOutput = serde_json::from_slice(stdout).map_err(|e| {
        tracing::warn!("Unreadable ffprobe output for {}: {}", file_name, e);
        MediaError::MetadataFailed("could not read ffprobe output".to_string())
    })?;

    let streams = report
        .streams
        .into_iter()
        .map(|s| {
            let codec = s
                .codec_long_name
                .or(s.codec_name)
                .unwrap_or_else(|| "Unknown".to_string());
            let details = match s.codec_type.as_deref() {
                Some("video") => StreamDetails::Video {
                    width: s.width,
                    height: s.height,
                    fps: format_frame_rate(s.r_frame_rate.as_deref().unwrap_or("0/1")),
                },
                Some("audio") => StreamDetails::Audio {
                    sample_rate: parse_number(&s.sample_rate),
                    channels: s.channels,
                },
                other => StreamDetails::Other {
                    kind: other.unwrap_or("unknown").to_string(),
                },
            };
            StreamInfo { codec, details }
        })
        .collect();

    Ok(MediaMetadata {
        file_name: file_name.to_string(),
        format: report
            .format
            .format_long_name
            .clone()
            .or(report.format.format_name.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        duration_secs: parse_number(&report.format.duration).unwrap_or(0.0),
        size: parse_number(&report.format.size).unwrap_or(0),
        bit_rate: parse_number(&report.format.bit_rate).unwrap_or(0),
        streams,
    })
}

fn or_unknown<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Renders metadata as a Telegram HTML message
pub fn format_metadata_message(metadata: &MediaMetadata) -> String {
    let size = if metadata.size > 0 {
        format_file_size(metadata.size)
    } else {
        "Unknown".to_string()
    };

    let mut lines = vec![
        "📊 <b>File Metadata</b>".to_string(),
        String::new(),
        format!("📁 <b>Filename:</b> <code>{}</code>", html::escape(&metadata.file_name)),
        format!("📦 <b>Format:</b> {}", html::escape(&metadata.format)),
        format!("⏱️ <b>Duration:</b> {}", format_duration(metadata.duration_secs)),
        format!("💾 <b>Size:</b> {}", size),
        format!("📈 <b>Bitrate:</b> {}", format_bitrate(metadata.bit_rate)),
        String::new(),
        "<b>Streams:</b>".to_string(),
    ];

    for (i, stream) in metadata.streams.iter().enumerate() {
        let n = i + 1;
        let codec = html::escape(&stream.codec);
        match &stream.details {
            StreamDetails::Video { width, height, fps } => lines.push(format!(
                "  🎬 <b>Video #{}:</b> {}\n      Resolution: {}x{}\n      FPS: {}",
                n,
                codec,
                or_unknown(*width),
                or_unknown(*height),
                fps
            )),
            StreamDetails::Audio {
                sample_rate,
                channels,
            } => lines.push(format!(
                "  🔊 <b>Audio #{}:</b> {}\n      Sample Rate: {} Hz\n      Channels: {}",
                n,
                codec,
                or_unknown(*sample_rate),
                or_unknown(*channels)
            )),
            StreamDetails::Other { kind } => lines.push(format!(
                "  📎 <b>{} #{}:</b> {}",
                html::escape(&capitalize(kind)),
                n,
                codec
            )),
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "codec_long_name": "H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10",
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30000/1001"
            },
            {
                "index": 1,
                "codec_name": "aac",
                "codec_type": "audio",
                "sample_rate": "48000",
                "channels": 2
            },
            {
                "index": 2,
                "codec_name": "subrip",
                "codec_type": "subtitle"
            }
        ],
        "format": {
            "filename": "clip.mkv",
            "format_name": "matroska,webm",
            "format_long_name": "Matroska / WebM",
            "duration": "125.500000",
            "size": "52428800",
            "bit_rate": "3342000"
        }
    }"#;

    #[test]
    fn test_parse_ffprobe_output() {
        let meta = parse_ffprobe_output("clip.mkv", SAMPLE.as_bytes()).unwrap();
        assert_eq!(meta.format, "Matroska / WebM");
        assert_eq!(meta.size, 52_428_800);
        assert_eq!(meta.bit_rate, 3_342_000);
        assert!((meta.duration_secs - 125.5).abs() < f64::EPSILON);
        assert_eq!(meta.streams.len(), 3);
        assert_eq!(
            meta.streams[0].details,
            StreamDetails::Video {
                width: Some(1920),
                height: Some(1080),
                fps: "29.97 fps".to_string()
            }
        );
        assert_eq!(meta.streams[1].codec, "aac");
        assert_eq!(
            meta.streams[1].details,
            StreamDetails::Audio {
                sample_rate: Some(48000),
                channels: Some(2)
            }
        );
    }

    #[test]
    fn test_parse_tolerates_missing_sections() {
        let meta = parse_ffprobe_output("x.mp3", b"{}").unwrap();
        assert_eq!(meta.format, "Unknown");
        assert!(meta.streams.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_ffprobe_output("x.mp3", b"not json"),
            Err(MediaError::MetadataFailed(_))
        ));
    }

    #[test]
    fn test_format_metadata_message() {
        let meta = parse_ffprobe_output("<clip>.mkv", SAMPLE.as_bytes()).unwrap();
        let text = format_metadata_message(&meta);

        assert!(text.contains("<code>&lt;clip&gt;.mkv</code>"));
        assert!(text.contains("Duration:</b> 02:05"));
        assert!(text.contains("Size:</b> 50.0 MB"));
        assert!(text.contains("Bitrate:</b> 3.3 Mbps"));
        assert!(text.contains("Resolution: 1920x1080"));
        assert!(text.contains("Sample Rate: 48000 Hz"));
        assert!(text.contains("📎 <b>Subtitle #3:</b> subrip"));
    }

    #[tokio::test]
    async fn test_missing_ffprobe_is_metadata_failure() {
        let extractor = FfprobeExtractor::new(
            PathBuf::from("/nonexistent/ffprobe-xyz"),
            Duration::from_secs(5),
        );
        let result = extractor.read_metadata(Path::new("/tmp/whatever.mp4")).await;
        assert!(matches!(result, Err(MediaError::MetadataFailed(_))));
    }
}
