use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::BotConfig;
use crate::error::MediaError;
use crate::models::{AudioBitrate, ConversionRequest, OutputFormat, Quality, TargetKind};
use crate::services::tool::run_tool;

/// Turns one input file into exactly one output file.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        request: &ConversionRequest,
    ) -> Result<PathBuf, MediaError>;
}

pub struct FfmpegConverter {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

impl FfmpegConverter {
    pub fn new(ffmpeg_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            timeout,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.ffmpeg_path.clone(), config.conversion_timeout)
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        request: &ConversionRequest,
    ) -> Result<PathBuf, MediaError> {
        let args = build_ffmpeg_args(input, output, request);

        tracing::info!(
            "🎞️ Converting {} -> {}",
            input.display(),
            output.display()
        );

        run_tool(&self.ffmpeg_path, &args, self.timeout).await?;

        // A zero exit without an output file still counts as a failed conversion
        match tokio::fs::metadata(output).await {
            Ok(m) if m.len() > 0 => Ok(output.to_path_buf()),
            _ => Err(MediaError::ConversionFailed(
                "ffmpeg produced no output".to_string(),
            )),
        }
    }
}

/// Full ffmpeg argument list for a request. Pure, so it can be checked without ffmpeg.
pub fn build_ffmpeg_args(input: &Path, output: &Path, request: &ConversionRequest) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
    ];

    match (request.kind, request.format) {
        (TargetKind::AudioExtract, format) => audio_args(&mut args, format, request.quality),
        (TargetKind::FormatConvert, OutputFormat::Mp4) => match request.quality {
            Some(Quality::Video(resolution)) => {
                let (w, h) = resolution.dimensions();
                args.extend([
                    "-vf".into(),
                    format!(
                        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
                    ),
                ]);
                x264_args(&mut args);
            }
            _ => {
                x264_args(&mut args);
                args.extend(["-movflags".into(), "+faststart".into()]);
            }
        },
        (TargetKind::FormatConvert, format) => audio_args(&mut args, format, request.quality),
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

fn audio_args(args: &mut Vec<String>, format: OutputFormat, quality: Option<Quality>) {
    args.extend(["-vn".into(), "-acodec".into(), format.audio_codec().into()]);

    if !format.is_lossless() {
        let bitrate = match quality {
            Some(Quality::Audio(bitrate)) => bitrate,
            _ => AudioBitrate::default(),
        };
        args.extend(["-b:a".into(), bitrate.ffmpeg_value().into()]);
    }
}

fn x264_args(args: &mut Vec<String>) {
    args.extend(
        [
            "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-c:a", "aac", "-b:a", "192k",
        ]
        .map(String::from),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VideoResolution;

    fn args_for(request: ConversionRequest) -> Vec<String> {
        build_ffmpeg_args(Path::new("/tmp/in.mkv"), Path::new("/tmp/out"), &request)
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_extract_audio_args() {
        let args = args_for(ConversionRequest::extract_audio(AudioBitrate::Kbps320));
        assert_eq!(&args[..5], ["-hide_banner", "-nostdin", "-y", "-i", "/tmp/in.mkv"]);
        assert!(args.contains(&"-vn".to_string()));
        assert!(has_pair(&args, "-acodec", "libmp3lame"));
        assert!(has_pair(&args, "-b:a", "320k"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out"));
    }

    #[test]
    fn test_lossless_audio_has_no_bitrate() {
        let args = args_for(ConversionRequest::convert_audio(
            OutputFormat::Flac,
            AudioBitrate::Kbps320,
        ));
        assert!(has_pair(&args, "-acodec", "flac"));
        assert!(!args.contains(&"-b:a".to_string()));

        let args = args_for(ConversionRequest::convert_audio(
            OutputFormat::Wav,
            AudioBitrate::Kbps128,
        ));
        assert!(has_pair(&args, "-acodec", "pcm_s16le"));
        assert!(!args.contains(&"-b:a".to_string()));
    }

    #[test]
    fn test_audio_bitrate_defaults_to_medium() {
        let request = ConversionRequest {
            kind: TargetKind::FormatConvert,
            format: OutputFormat::Ogg,
            quality: None,
        };
        let args = args_for(request);
        assert!(has_pair(&args, "-acodec", "libvorbis"));
        assert!(has_pair(&args, "-b:a", "192k"));
    }

    #[test]
    fn test_resolution_change_args() {
        let args = args_for(ConversionRequest::change_resolution(VideoResolution::P720));
        assert!(has_pair(
            &args,
            "-vf",
            "scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2"
        ));
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-crf", "23"));
        assert!(!args.contains(&"-movflags".to_string()));
    }

    #[test]
    fn test_mp4_conversion_args() {
        let args = args_for(ConversionRequest::to_mp4());
        assert!(has_pair(&args, "-preset", "medium"));
        assert!(has_pair(&args, "-c:a", "aac"));
        assert!(has_pair(&args, "-movflags", "+faststart"));
        assert!(!args.contains(&"-vn".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_without_output_is_failure() {
        let temp = tempfile::tempdir().unwrap();
        // `true` ignores its arguments and exits 0 without writing anything
        let converter = FfmpegConverter::new(PathBuf::from("true"), Duration::from_secs(5));
        let result = converter
            .convert(
                &temp.path().join("in.mkv"),
                &temp.path().join("out.mp3"),
                &ConversionRequest::extract_audio(AudioBitrate::Kbps192),
            )
            .await;
        assert!(matches!(result, Err(MediaError::ConversionFailed(_))));
    }
}
