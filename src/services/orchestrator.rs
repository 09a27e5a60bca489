use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::BotConfig;
use crate::error::MediaError;
use crate::models::{
    ConversionJob, ConversionRequest, DownloadTarget, JobAction, JobSource, JobState, MediaKind,
    OwnerId, Quality, StoredFile,
};
use crate::services::cleanup::{CleanupReport, CleanupService};
use crate::services::converter::Converter;
use crate::services::downloader::{UrlDownloader, supported_url};
use crate::services::extractor::{MetadataReader, format_metadata_message};
use crate::services::storage::StorageService;
use crate::services::workspace::JobWorkspace;
use crate::utils::format::format_file_size;
use crate::utils::validation::{
    UploadValidator, fit_file_name, is_executable_content, sanitize_filename, validate_file_size,
};

/// Bytes inspected for executable signatures after download
const HEADER_LEN: usize = 16;
/// Characters of a media title used in a caption
const CAPTION_TITLE_CHARS: usize = 100;

/// The messaging backend as seen by a job
#[async_trait]
pub trait MediaGateway: Send + Sync {
    /// Fetches a remote file into `dest`, returns the bytes written
    async fn download(&self, file_id: &str, dest: &Path) -> Result<u64, MediaError>;
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), MediaError>;
    async fn send_file(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        kind: MediaKind,
        caption: &str,
    ) -> Result<(), MediaError>;
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub owner: OwnerId,
    pub chat_id: i64,
    pub source: JobSource,
    pub action: JobAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutput {
    Delivered { file_name: String, size: u64 },
    Metadata(String),
    Saved(StoredFile),
}

/// Final record of a job, after cleanup
#[derive(Debug)]
pub struct JobReport {
    pub job: ConversionJob,
    pub outcome: Result<JobOutput, MediaError>,
    pub cleanup: CleanupReport,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok() && self.job.state() == JobState::Delivered
    }
}

/// Runs jobs: validate, fetch into a private workspace, convert or inspect
/// or store, deliver, and always purge the workspace.
pub struct JobOrchestrator {
    validator: UploadValidator,
    storage: Arc<dyn StorageService>,
    converter: Arc<dyn Converter>,
    metadata_reader: Arc<dyn MetadataReader>,
    downloader: Arc<dyn UrlDownloader>,
    cleanup: CleanupService,
    temp_root: PathBuf,
    delivery_limit: u64,
    max_jobs: usize,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl JobOrchestrator {
    pub fn new(
        config: &BotConfig,
        storage: Arc<dyn StorageService>,
        converter: Arc<dyn Converter>,
        metadata_reader: Arc<dyn MetadataReader>,
        downloader: Arc<dyn UrlDownloader>,
        cleanup: CleanupService,
    ) -> Self {
        Self {
            validator: UploadValidator::from_config(config),
            storage,
            converter,
            metadata_reader,
            downloader,
            cleanup,
            temp_root: config.temp_dir.clone(),
            delivery_limit: config.delivery_limit,
            max_jobs: config.max_concurrent_jobs,
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn validator(&self) -> &UploadValidator {
        &self.validator
    }

    /// Jobs currently holding a slot
    pub fn active_jobs(&self) -> usize {
        self.max_jobs
            .saturating_sub(self.permits.available_permits())
    }

    /// Stops running jobs; they fail with `Cancelled` and are purged
    pub fn shutdown(&self) {
        tracing::info!("🛑 Cancelling {} running jobs", self.active_jobs());
        self.cancel.cancel();
    }

    /// Validates the request and, if it passes, runs the job to a terminal state.
    ///
    /// A rejected file or link returns `Err` and no job is created. Once a job
    /// exists the result is always `Ok(JobReport)`, with failures inside
    /// `outcome`. The user is notified through the gateway either way.
    pub async fn submit(
        &self,
        gateway: &dyn MediaGateway,
        request: JobRequest,
    ) -> Result<JobReport, MediaError> {
        let source_name = self.admit(&request)?;

        let mut job = ConversionJob::new(request.owner, source_name, request.action);
        job.advance(JobState::Validated);

        let span = tracing::info_span!("job", id = %job.id, user = %request.owner, action = %request.action);
        self.run(gateway, job, request).instrument(span).await
    }

    /// Checks the source against the action, returns the name the job is known by
    fn admit(&self, request: &JobRequest) -> Result<String, MediaError> {
        match (&request.source, request.action) {
            (JobSource::Telegram(file), JobAction::Download(_)) => {
                Err(MediaError::InvalidUrl(file.file_name.clone()))
            }
            (JobSource::Telegram(file), _) => {
                let name = sanitize_filename(&file.file_name)?;
                self.validator
                    .validate(&name, file.mime_type.as_deref(), file.size)?;
                Ok(name)
            }
            (JobSource::Url(url), JobAction::Download(_)) => supported_url(url)
                .map(|u| u.to_string())
                .ok_or_else(|| MediaError::InvalidUrl(url.clone())),
            (JobSource::Url(url), _) => Err(MediaError::InvalidUrl(url.clone())),
        }
    }

    async fn run(
        &self,
        gateway: &dyn MediaGateway,
        mut job: ConversionJob,
        request: JobRequest,
    ) -> Result<JobReport, MediaError> {
        tracing::info!("📥 Job started for {}", job.source_name);

        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit.ok(),
            _ = self.cancel.cancelled() => None,
        };
        let Some(_permit) = permit else {
            job.fail();
            let error = MediaError::Cancelled;
            self.notify_failure(gateway, request.chat_id, &error).await;
            return Ok(JobReport {
                job,
                outcome: Err(error),
                cleanup: CleanupReport::default(),
            });
        };

        let mut workspace = match JobWorkspace::create(&self.temp_root, job.owner, job.id).await {
            Ok(ws) => ws,
            Err(error) => {
                job.fail();
                self.notify_failure(gateway, request.chat_id, &error).await;
                return Ok(JobReport {
                    job,
                    outcome: Err(error),
                    cleanup: CleanupReport::default(),
                });
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MediaError::Cancelled),
            result = self.execute(gateway, &mut job, &mut workspace, &request) => result,
        };

        if let Err(error) = &outcome {
            job.fail();
            tracing::warn!("❌ Job failed [{}]: {}", error.code(), error);
        }

        let cleanup = self.cleanup.purge(&mut workspace).await;

        match &outcome {
            Ok(_) => tracing::info!("✅ Job delivered"),
            Err(error) => self.notify_failure(gateway, request.chat_id, error).await,
        }

        Ok(JobReport {
            job,
            outcome,
            cleanup,
        })
    }

    async fn execute(
        &self,
        gateway: &dyn MediaGateway,
        job: &mut ConversionJob,
        workspace: &mut JobWorkspace,
        request: &JobRequest,
    ) -> Result<JobOutput, MediaError> {
        let output = match (&request.source, job.action) {
            (JobSource::Url(url), JobAction::Download(target)) => {
                self.fetch_link(gateway, job, workspace, request.chat_id, url, target)
                    .await?
            }
            (JobSource::Telegram(file), _) => {
                self.process_upload(gateway, job, workspace, request.chat_id, &file.file_id)
                    .await?
            }
            (JobSource::Url(url), _) => return Err(MediaError::InvalidUrl(url.clone())),
        };

        job.advance(JobState::Delivered);
        Ok(output)
    }

    async fn process_upload(
        &self,
        gateway: &dyn MediaGateway,
        job: &mut ConversionJob,
        workspace: &mut JobWorkspace,
        chat_id: i64,
        file_id: &str,
    ) -> Result<JobOutput, MediaError> {
        let input = workspace.artifact("source", &job.source_name);

        let received = gateway.download(file_id, &input).await?;
        validate_file_size(received, self.validator.max_file_size())?;
        refuse_executable(&input, &job.source_name).await?;
        job.source_path = Some(input.clone());
        job.advance(JobState::Downloaded);

        let output = match job.action {
            JobAction::Convert(conversion) => {
                let file_name = conversion.output_file_name(&job.source_name);
                let output_path = workspace.artifact("output", &file_name);

                self.converter
                    .convert(&input, &output_path, &conversion)
                    .await?;
                job.advance(JobState::Converted);

                let size = tokio::fs::metadata(&output_path).await?.len();
                validate_file_size(size, self.delivery_limit)?;

                let kind = if conversion.format.is_video() {
                    MediaKind::Video
                } else {
                    MediaKind::Audio
                };
                gateway
                    .send_file(
                        chat_id,
                        &output_path,
                        &file_name,
                        kind,
                        &delivery_caption(&conversion),
                    )
                    .await?;

                JobOutput::Delivered { file_name, size }
            }
            JobAction::Metadata => {
                let mut metadata = self.metadata_reader.read_metadata(&input).await?;
                metadata.file_name = job.source_name.clone();
                job.advance(JobState::Converted);

                let text = format_metadata_message(&metadata);
                gateway.send_text(chat_id, &text).await?;

                JobOutput::Metadata(text)
            }
            JobAction::Save => {
                job.advance(JobState::Converted);

                let stored = self
                    .storage
                    .save_from_path(job.owner, &job.source_name, &input)
                    .await?;
                gateway
                    .send_text(
                        chat_id,
                        &format!(
                            "💾 Saved as <code>{}</code> ({})\n\nUse /files to see your stored files.",
                            teloxide::utils::html::escape(&stored.file_name),
                            format_file_size(stored.size)
                        ),
                    )
                    .await?;

                JobOutput::Saved(stored)
            }
            JobAction::Download(_) => {
                return Err(MediaError::InvalidUrl(job.source_name.clone()));
            }
        };

        Ok(output)
    }

    async fn fetch_link(
        &self,
        gateway: &dyn MediaGateway,
        job: &mut ConversionJob,
        workspace: &mut JobWorkspace,
        chat_id: i64,
        url: &str,
        target: DownloadTarget,
    ) -> Result<JobOutput, MediaError> {
        let media = self
            .downloader
            .download(url, target, workspace.path())
            .await?;
        let path = workspace.adopt(media.path);

        let size = tokio::fs::metadata(&path).await?.len();
        validate_file_size(size, self.delivery_limit)?;
        refuse_executable(&path, url).await?;
        job.source_path = Some(path.clone());
        job.advance(JobState::Downloaded);
        // The downloader already produced the requested container
        job.advance(JobState::Converted);

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(target.extension());
        let file_name = title_file_name(&media.title, extension);

        let title: String = media.title.chars().take(CAPTION_TITLE_CHARS).collect();
        let caption = match target.media_kind() {
            MediaKind::Video => format!("🎬 {}", title),
            MediaKind::Audio => format!("🎵 {}", title),
        };
        gateway
            .send_file(chat_id, &path, &file_name, target.media_kind(), &caption)
            .await?;

        Ok(JobOutput::Delivered { file_name, size })
    }


    async fn notify_failure(&self, gateway: &dyn MediaGateway, chat_id: i64, error: &MediaError) {
        let text = teloxide::utils::html::escape(&error.user_message());
        if let Err(e) = gateway.send_text(chat_id, &text).await {
            tracing::error!("Could not notify chat {} about a failed job: {}", chat_id, e);
        }
    }
}

async fn read_header(path: &Path) -> Result<Vec<u8>, MediaError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut header = vec![0u8; HEADER_LEN];
    let n = file.read(&mut header).await?;
    header.truncate(n);
    Ok(header)
}

async fn refuse_executable(path: &Path, label: &str) -> Result<(), MediaError> {
    if is_executable_content(&read_header(path).await?) {
        tracing::warn!("Executable content disguised as {}", label);
        return Err(MediaError::UnsupportedFormat {
            extension: "executable".to_string(),
        });
    }
    Ok(())
}

/// Delivered name of a downloaded file, built from its title
fn title_file_name(title: &str, extension: &str) -> String {
    // Separators become underscores and dot runs collapse, so no ".." survives
    let mut flat = String::with_capacity(title.len());
    for c in title.chars() {
        let c = if c == '/' || c == '\\' { '_' } else { c };
        if c == '.' && flat.ends_with('.') {
            continue;
        }
        flat.push(c);
    }

    let stem = sanitize_filename(&flat).unwrap_or_default();
    let stem = stem.trim_end_matches('.');
    let stem = if stem.is_empty() { "download" } else { stem };
    fit_file_name(stem, &format!(".{}", extension))
}

fn delivery_caption(request: &ConversionRequest) -> String {
    let target = request.format.extension().to_uppercase();
    match request.quality {
        Some(Quality::Video(resolution)) => format!("🎬 Converted to {}", resolution.label()),
        Some(Quality::Audio(bitrate)) if !request.format.is_lossless() => {
            format!("🎵 Converted to {} ({})", target, bitrate.label())
        }
        _ if request.format.is_video() => format!("🎬 Converted to {}", target),
        _ => format!("🎵 Converted to {}", target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AudioBitrate, OutputFormat, VideoResolution};

    #[test]
    fn test_title_file_name() {
        assert_eq!(title_file_name("Big Buck Bunny", "mp4"), "Big Buck Bunny.mp4");
        assert_eq!(title_file_name("AC/DC: Live", "mp3"), "AC_DC_ Live.mp3");
        assert_eq!(title_file_name("...", "mp3"), "download.mp3");
        assert_eq!(title_file_name("Wait... what.", "mp4"), "Wait. what.mp4");

        let long = title_file_name(&"t".repeat(400), "mp4");
        assert_eq!(long.len(), 255);
        assert!(long.ends_with(".mp4"));
    }

    #[test]
    fn test_delivery_caption() {
        assert_eq!(
            delivery_caption(&ConversionRequest::extract_audio(AudioBitrate::Kbps192)),
            "🎵 Converted to MP3 (192 kbps (Medium))"
        );
        assert_eq!(
            delivery_caption(&ConversionRequest::change_resolution(VideoResolution::P480)),
            "🎬 Converted to 480p (SD)"
        );
        assert_eq!(
            delivery_caption(&ConversionRequest::convert_audio(
                OutputFormat::Flac,
                AudioBitrate::Kbps320
            )),
            "🎵 Converted to FLAC"
        );
        assert_eq!(
            delivery_caption(&ConversionRequest::to_mp4()),
            "🎬 Converted to MP4"
        );
    }
}
