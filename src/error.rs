use std::time::Duration;
use thiserror::Error;

use crate::utils::format::format_file_size;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Unsupported format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("File too large: {size} bytes exceeds {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Metadata extraction failed: {0}")]
    MetadataFailed(String),

    #[error("Invalid link: {0}")]
    InvalidUrl(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("External tool timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage I/O error: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Job cancelled")]
    Cancelled,
}

impl MediaError {
    /// Stable machine-readable code, used in logs
    pub fn code(&self) -> &'static str {
        match self {
            MediaError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            MediaError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            MediaError::InvalidName(_) => "INVALID_NAME",
            MediaError::NotFound(_) => "NOT_FOUND",
            MediaError::ConversionFailed(_) => "CONVERSION_FAILED",
            MediaError::MetadataFailed(_) => "METADATA_FAILED",
            MediaError::InvalidUrl(_) => "INVALID_URL",
            MediaError::DownloadFailed(_) => "DOWNLOAD_FAILED",
            MediaError::Timeout(_) => "TIMEOUT",
            MediaError::StorageIo(_) => "STORAGE_IO",
            MediaError::Transfer(_) => "TRANSFER_FAILED",
            MediaError::Cancelled => "CANCELLED",
        }
    }

    /// Plain message shown to the requesting user. Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            MediaError::UnsupportedFormat { extension } => {
                let ext = if extension.is_empty() { "(none)" } else { extension };
                format!("❌ Unsupported file format: {}", ext)
            }
            MediaError::FileTooLarge { size, limit } => format!(
                "❌ File too large!\n\nMaximum size: {}\nYour file: {}",
                format_file_size(*limit),
                format_file_size(*size)
            ),
            MediaError::InvalidName(_) => "❌ Invalid filename.".to_string(),
            MediaError::NotFound(name) => format!(
                "❌ File not found: {}\n\nUse /files to see your stored files.",
                name
            ),
            MediaError::ConversionFailed(diagnostic) => format!(
                "❌ Conversion failed:\n{}\n\nPlease try again or send a different file.",
                diagnostic
            ),
            MediaError::MetadataFailed(diagnostic) => format!(
                "❌ Error extracting metadata:\n{}\n\nPlease try again or send a different file.",
                diagnostic
            ),
            MediaError::InvalidUrl(_) => "❌ This link is not supported.\n\n\
                 Send a link from YouTube, Instagram, TikTok, Twitter/X, Facebook, Vimeo and others."
                .to_string(),
            MediaError::DownloadFailed(diagnostic) => {
                if diagnostic.contains("Video unavailable") || diagnostic.contains("Private video") {
                    "❌ Video unavailable\n\nThis video might be private, deleted, or region-locked."
                        .to_string()
                } else if diagnostic.contains("Sign in") {
                    "❌ Login required\n\nThis content requires authentication and cannot be downloaded."
                        .to_string()
                } else {
                    format!(
                        "❌ Download failed:\n{}\n\nPlease try again or use a different quality.",
                        diagnostic
                    )
                }
            }
            MediaError::Timeout(limit) => format!(
                "⏱️ Processing took longer than {} seconds and was stopped.\n\nTry a lower quality setting or a shorter file.",
                limit.as_secs()
            ),
            MediaError::StorageIo(e) => {
                tracing::error!("Storage error: {:?}", e);
                "❌ A storage error occurred. Please try again.".to_string()
            }
            MediaError::Transfer(_) => {
                "❌ Could not transfer the file to or from Telegram. Please try again.".to_string()
            }
            MediaError::Cancelled => "🛑 The operation was cancelled.".to_string(),
        }
    }
}
