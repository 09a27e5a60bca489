use tg_media_bot::config::BotConfig;
use tg_media_bot::error::MediaError;
use tg_media_bot::models::{MediaKind, OwnerId};
use tg_media_bot::services::cleanup::CleanupService;
use tg_media_bot::services::storage::{LocalStorageService, StorageService};
use tg_media_bot::utils::keyed_mutex::KeyedMutex;
use tg_media_bot::utils::validation::{UploadValidator, sanitize_filename};

#[tokio::test]
async fn test_traversal_names_are_rejected_by_storage() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("storage");
    let storage = LocalStorageService::new(root.clone(), CleanupService::new(0), KeyedMutex::new());

    // A file outside the store that a traversal would reach
    let victim = temp.path().join("passwd");
    std::fs::write(&victim, b"root:x:0:0").unwrap();

    for name in ["../../etc/passwd", "../passwd", "..\\passwd", "sub/dir.mp3", ".hidden", ""] {
        assert!(
            matches!(
                storage.save(OwnerId(1), name, b"x").await,
                Err(MediaError::InvalidName(_))
            ),
            "save accepted {:?}",
            name
        );
        assert!(
            matches!(
                storage.delete(OwnerId(1), name).await,
                Err(MediaError::InvalidName(_))
            ),
            "delete accepted {:?}",
            name
        );
    }

    assert!(victim.exists());
    assert!(!root.join("1").exists());
}

#[test]
fn test_uploaded_names_are_sanitized() {
    assert_eq!(sanitize_filename("../../etc/passwd.mp3").unwrap(), "passwd.mp3");
    assert_eq!(sanitize_filename("C:\\Users\\me\\song.flac").unwrap(), "song.flac");
    assert_eq!(sanitize_filename("a|b?.mp4").unwrap(), "a_b_.mp4");
    assert_eq!(sanitize_filename("...mp3").unwrap(), "mp3");
    assert!(matches!(sanitize_filename("../.."), Err(MediaError::InvalidName(_))));
}

#[test]
fn test_validator_allow_list() {
    let validator = UploadValidator::from_config(&BotConfig::default());
    let limit = validator.max_file_size();

    assert_eq!(validator.validate("clip.MKV", Some("video/x-matroska"), limit).unwrap(), MediaKind::Video);
    assert_eq!(validator.validate("voice.ogg", Some("audio/ogg"), 10).unwrap(), MediaKind::Audio);
    assert_eq!(validator.validate("song.m4a", Some("application/octet-stream"), 10).unwrap(), MediaKind::Audio);

    assert!(matches!(
        validator.validate("setup.exe", None, 10),
        Err(MediaError::UnsupportedFormat { .. })
    ));
    assert!(matches!(
        validator.validate("noextension", None, 10),
        Err(MediaError::UnsupportedFormat { ref extension }) if extension.is_empty()
    ));
    assert!(matches!(
        validator.validate("clip.mp4", Some("application/x-msdownload"), 10),
        Err(MediaError::UnsupportedFormat { .. })
    ));
    assert!(matches!(
        validator.validate("clip.mp4", None, limit + 1),
        Err(MediaError::FileTooLarge { .. })
    ));
}
