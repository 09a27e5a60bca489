use std::path::Path;

use crate::config::BotConfig;
use crate::error::MediaError;
use crate::models::MediaKind;

/// Longest file name we keep, in bytes (NAME_MAX on common filesystems)
pub const MAX_NAME_LEN: usize = 255;

/// Extensions longer than this are treated as part of the stem when truncating
const MAX_EXTENSION_LEN: usize = 16;

/// Declared MIME types that say nothing about the content and are judged by extension alone
const OPAQUE_MIME_TYPES: &[&str] = &["application/octet-stream", "binary/octet-stream"];

/// Lower-cased extension with its leading dot, or "" when there is none
pub fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Validates file size against maximum limit
pub fn validate_file_size(size: u64, max_size: u64) -> Result<(), MediaError> {
    if size > max_size {
        return Err(MediaError::FileTooLarge {
            size,
            limit: max_size,
        });
    }
    Ok(())
}

/// Validates a declared MIME type: only audio and video top-level types pass
pub fn validate_mime_type(content_type: &str) -> Result<(), MediaError> {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if OPAQUE_MIME_TYPES.contains(&normalized.as_str()) {
        return Ok(());
    }

    match normalized.parse::<mime::Mime>() {
        Ok(parsed) if parsed.type_() == mime::AUDIO || parsed.type_() == mime::VIDEO => Ok(()),
        _ => Err(MediaError::UnsupportedFormat {
            extension: normalized,
        }),
    }
}

/// Rejects names that could escape a user's directory or hide from listings.
///
/// Nothing is stripped or rewritten: a name either passes untouched or the
/// request fails before any filesystem access.
pub fn validate_name(filename: &str) -> Result<(), MediaError> {
    let reject = |reason: &str| {
        tracing::warn!("Rejected file name {:?}: {}", filename, reason);
        Err(MediaError::InvalidName(filename.to_string()))
    };

    if filename.trim().is_empty() {
        return reject("empty");
    }
    if filename.len() > MAX_NAME_LEN {
        return reject("too long");
    }
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return reject("path traversal");
    }
    if filename.chars().any(|c| c.is_control()) {
        return reject("control characters");
    }
    if filename.starts_with('.') {
        return reject("hidden file");
    }

    Ok(())
}

/// Sanitizes a client-supplied filename (Telegram metadata) into a storable one.
///
/// Keeps only the last path component and replaces reserved characters.
pub fn sanitize_filename(filename: &str) -> Result<String, MediaError> {
    // Telegram clients may send Windows paths; normalise separators first
    let unified = filename.replace('\\', "/");
    let name = unified.rsplit('/').next().unwrap_or("").trim();

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from uploaded name: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');

    // Over-long names lose the end of the stem, never the extension
    let sanitized = match sanitized.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= MAX_EXTENSION_LEN => {
            fit_file_name(stem, &format!(".{}", ext))
        }
        _ => fit_file_name(sanitized, ""),
    };

    validate_name(&sanitized)?;
    Ok(sanitized)
}

/// Joins `stem` and `tail`, cutting the stem at a char boundary so the
/// result stays within `MAX_NAME_LEN` bytes.
pub fn fit_file_name(stem: &str, tail: &str) -> String {
    let budget = MAX_NAME_LEN.saturating_sub(tail.len());
    let mut end = stem.len().min(budget);
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &stem[..end], tail)
}

/// Checks if file content appears to be executable
pub fn is_executable_content(header: &[u8]) -> bool {
    if header.len() < 4 {
        return false;
    }

    // ELF binary (Linux)
    if header.starts_with(&[0x7F, 0x45, 0x4C, 0x46]) {
        return true;
    }

    // PE/COFF (Windows .exe, .dll)
    if header.starts_with(&[0x4D, 0x5A]) {
        return true;
    }

    // Mach-O (macOS)
    if header.starts_with(&[0xFE, 0xED, 0xFA, 0xCE])
        || header.starts_with(&[0xFE, 0xED, 0xFA, 0xCF])
        || header.starts_with(&[0xCE, 0xFA, 0xED, 0xFE])
        || header.starts_with(&[0xCF, 0xFA, 0xED, 0xFE])
    {
        return true;
    }

    // Shebang (shell scripts)
    header.starts_with(b"#!")
}

/// Allow-list check for incoming media files.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    video_formats: Vec<String>,
    audio_formats: Vec<String>,
    max_file_size: u64,
}

impl UploadValidator {
    pub fn new(video_formats: Vec<String>, audio_formats: Vec<String>, max_file_size: u64) -> Self {
        Self {
            video_formats,
            audio_formats,
            max_file_size,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(
            config.video_formats.clone(),
            config.audio_formats.clone(),
            config.max_file_size,
        )
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Media kind for an allowed extension, None otherwise
    pub fn media_kind(&self, filename: &str) -> Option<MediaKind> {
        let ext = file_extension(filename);
        if self.video_formats.iter().any(|f| *f == ext) {
            Some(MediaKind::Video)
        } else if self.audio_formats.iter().any(|f| *f == ext) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    /// Full validation pipeline for an announced upload. Pure: touches nothing.
    pub fn validate(
        &self,
        filename: &str,
        content_type: Option<&str>,
        size: u64,
    ) -> Result<MediaKind, MediaError> {
        // 1. Extension allow-list
        let kind = self
            .media_kind(filename)
            .ok_or_else(|| MediaError::UnsupportedFormat {
                extension: file_extension(filename),
            })?;

        // 2. Declared MIME, when the client sent one
        if let Some(mime) = content_type {
            validate_mime_type(mime)?;
        }

        // 3. Size ceiling
        validate_file_size(size, self.max_file_size)?;

        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u64 = 50 * 1024 * 1024;

    fn validator() -> UploadValidator {
        UploadValidator::from_config(&BotConfig::default())
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("clip.MKV"), ".mkv");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("README"), "");
    }

    #[test]
    fn test_validate_file_size() {
        assert!(validate_file_size(1024, MAX).is_ok());
        assert!(validate_file_size(MAX, MAX).is_ok());
        assert!(matches!(
            validate_file_size(MAX + 1, MAX),
            Err(MediaError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_mime_type() {
        assert!(validate_mime_type("video/mp4").is_ok());
        assert!(validate_mime_type("audio/mpeg").is_ok());
        assert!(validate_mime_type("video/x-matroska; codecs=avc1").is_ok());
        assert!(validate_mime_type("application/octet-stream").is_ok());

        assert!(validate_mime_type("application/x-msdownload").is_err());
        assert!(validate_mime_type("text/html").is_err());
        assert!(validate_mime_type("not a mime").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("clip.mp3").is_ok());
        assert!(validate_name("my song (live).flac").is_ok());
        assert!(validate_name("日本語.mp4").is_ok());

        assert!(validate_name("").is_err());
        assert!(validate_name("../../etc/passwd").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b.mp3").is_err());
        assert!(validate_name("a\\b.mp3").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("bad\0name.mp3").is_err());
        assert!(validate_name(&"a".repeat(300)).is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test.mp4").unwrap(), "test.mp4");
        assert_eq!(sanitize_filename("my file.mp3").unwrap(), "my file.mp3");
        assert_eq!(
            sanitize_filename("test<script>.mp4").unwrap(),
            "test_script_.mp4"
        );
        assert_eq!(sanitize_filename("日本語.mp4").unwrap(), "日本語.mp4");

        // Path traversal
        assert_eq!(sanitize_filename("../../../etc/passwd").unwrap(), "passwd");
        assert_eq!(
            sanitize_filename("..\\..\\windows\\clip.mkv").unwrap(),
            "clip.mkv"
        );

        assert!(sanitize_filename("../").is_err());
        assert_eq!(sanitize_filename(".clip.mp4").unwrap(), "clip.mp4");
    }

    #[test]
    fn test_sanitize_long_name_keeps_extension() {
        let long = format!("{}.mkv", "a".repeat(300));
        let name = sanitize_filename(&long).unwrap();
        assert_eq!(name.len(), MAX_NAME_LEN);
        assert!(name.ends_with(".mkv"));
        assert_eq!(validator().media_kind(&name), Some(MediaKind::Video));

        // Multi-byte characters are never split
        let wide = format!("{}.flac", "é".repeat(200));
        let name = sanitize_filename(&wide).unwrap();
        assert!(name.len() <= MAX_NAME_LEN);
        assert!(name.ends_with("é.flac"));
    }

    #[test]
    fn test_fit_file_name() {
        assert_eq!(fit_file_name("clip", ".mp3"), "clip.mp3");
        let fitted = fit_file_name(&"b".repeat(255), "_1080p.mp4");
        assert_eq!(fitted.len(), MAX_NAME_LEN);
        assert!(fitted.ends_with("b_1080p.mp4"));
    }

    #[test]
    fn test_is_executable_content() {
        assert!(is_executable_content(&[0x7F, 0x45, 0x4C, 0x46, 0x00]));
        assert!(is_executable_content(&[0x4D, 0x5A, 0x00, 0x00]));
        assert!(is_executable_content(b"#!/bin/bash"));
        assert!(!is_executable_content(b"ID3\x04 mp3 data"));
        assert!(!is_executable_content(&[0x1A, 0x45, 0xDF, 0xA3])); // Matroska
    }

    #[test]
    fn test_validator_accepts_media() {
        let v = validator();
        assert_eq!(
            v.validate("clip.mkv", Some("video/x-matroska"), 1024).unwrap(),
            MediaKind::Video
        );
        assert_eq!(v.validate("song.FLAC", None, 1024).unwrap(), MediaKind::Audio);
    }

    #[test]
    fn test_validator_rejects() {
        let v = validator();
        assert!(matches!(
            v.validate("clip.exe", None, 1024),
            Err(MediaError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            v.validate("clip.mp4", Some("application/x-msdownload"), 1024),
            Err(MediaError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            v.validate("clip.mp4", None, MAX + 1),
            Err(MediaError::FileTooLarge { .. })
        ));
    }
}
