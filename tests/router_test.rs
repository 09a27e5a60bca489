use std::sync::Arc;
use tg_media_bot::bot::commands::Command;
use tg_media_bot::bot::router::CommandRouter;
use tg_media_bot::config::BotConfig;
use tg_media_bot::models::OwnerId;
use tg_media_bot::services::cleanup::CleanupService;
use tg_media_bot::services::storage::{LocalStorageService, StorageService};
use tg_media_bot::utils::keyed_mutex::KeyedMutex;

fn setup() -> (tempfile::TempDir, Arc<LocalStorageService>, CommandRouter) {
    let temp = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalStorageService::new(
        temp.path().to_path_buf(),
        CleanupService::new(0),
        KeyedMutex::new(),
    ));
    let router = CommandRouter::new(&BotConfig::development(), storage.clone());
    (temp, storage, router)
}

#[tokio::test]
async fn test_start_and_help() {
    let (_temp, _storage, router) = setup();

    let welcome = router.dispatch(OwnerId(1), Command::Start).await;
    assert!(welcome.contains("Welcome"));

    let help = router.dispatch(OwnerId(1), Command::Help).await;
    assert!(help.contains("MKV"));
    assert!(help.contains("FLAC"));
    assert!(help.contains("50.0 MB"));
}

#[tokio::test]
async fn test_files_lists_only_own_files() {
    let (_temp, storage, router) = setup();

    let empty = router.dispatch(OwnerId(1), Command::Files).await;
    assert!(empty.contains("don't have any stored files"));

    storage.save(OwnerId(1), "<song>.mp3", &[0u8; 1024]).await.unwrap();
    storage.save(OwnerId(1), "b.mp3", &[0u8; 2048]).await.unwrap();
    storage.save(OwnerId(2), "other.mp3", &[0u8; 4096]).await.unwrap();

    let listing = router.dispatch(OwnerId(1), Command::Files).await;
    assert!(listing.contains("&lt;song&gt;.mp3"));
    assert!(!listing.contains("other.mp3"));
    // Only the caller's own bytes are counted
    assert!(listing.contains("Total size: 3.0 KB"));
}

#[tokio::test]
async fn test_delete_command() {
    let (_temp, storage, router) = setup();
    storage.save(OwnerId(1), "clip.mp4", b"abc").await.unwrap();

    let usage = router.dispatch(OwnerId(1), Command::Delete("  ".to_string())).await;
    assert!(usage.contains("Usage"));

    let deleted = router.dispatch(OwnerId(1), Command::Delete("clip.mp4".to_string())).await;
    assert!(deleted.contains("File deleted"));
    assert!(storage.list(OwnerId(1)).await.unwrap().is_empty());

    let missing = router.dispatch(OwnerId(1), Command::Delete("clip.mp4".to_string())).await;
    assert!(missing.contains("File not found: clip.mp4"));

    let traversal = router
        .dispatch(OwnerId(1), Command::Delete("../../etc/passwd".to_string()))
        .await;
    assert!(traversal.contains("Invalid filename"));
}

#[tokio::test]
async fn test_clear_command() {
    let (_temp, storage, router) = setup();

    let empty = router.dispatch(OwnerId(4), Command::Clear).await;
    assert!(empty.contains("already empty"));

    storage.save(OwnerId(4), "a.mp3", b"1").await.unwrap();
    storage.save(OwnerId(4), "b.mp3", b"2").await.unwrap();

    let cleared = router.dispatch(OwnerId(4), Command::Clear).await;
    assert!(cleared.contains("Deleted 2 file(s)"));
}
