use tg_media_bot::error::MediaError;
use tg_media_bot::models::OwnerId;
use tg_media_bot::services::cleanup::CleanupService;
use tg_media_bot::services::storage::{LocalStorageService, StorageService};
use tg_media_bot::utils::keyed_mutex::KeyedMutex;

fn storage(root: &std::path::Path) -> LocalStorageService {
    LocalStorageService::new(root.to_path_buf(), CleanupService::new(1), KeyedMutex::new())
}

#[tokio::test]
async fn test_save_list_and_delete() {
    let temp = tempfile::tempdir().unwrap();
    let storage = storage(temp.path());
    let owner = OwnerId(7);

    let stored = storage.save(owner, "track.mp3", b"id3 data").await.unwrap();
    assert_eq!(stored.file_name, "track.mp3");
    assert_eq!(stored.size, 8);
    assert_eq!(stored.path, temp.path().join("7").join("track.mp3"));
    assert_eq!(std::fs::read(&stored.path).unwrap(), b"id3 data");

    let files = storage.list(owner).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name, "track.mp3");

    storage.delete(owner, "track.mp3").await.unwrap();
    assert!(!stored.path.exists());
    assert!(storage.list(owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_names_get_numeric_suffix() {
    let temp = tempfile::tempdir().unwrap();
    let storage = storage(temp.path());
    let owner = OwnerId(7);

    let a = storage.save(owner, "clip.mp4", b"one").await.unwrap();
    let b = storage.save(owner, "clip.mp4", b"two").await.unwrap();
    let c = storage.save(owner, "clip.mp4", b"three").await.unwrap();

    assert_eq!(a.file_name, "clip.mp4");
    assert_eq!(b.file_name, "clip_1.mp4");
    assert_eq!(c.file_name, "clip_2.mp4");
    // The original is never overwritten
    assert_eq!(std::fs::read(&a.path).unwrap(), b"one");
}

#[tokio::test]
async fn test_concurrent_saves_never_collide() {
    let temp = tempfile::tempdir().unwrap();
    let storage = std::sync::Arc::new(storage(temp.path()));
    let owner = OwnerId(9);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let storage = storage.clone();
            tokio::spawn(async move {
                storage
                    .save(owner, "same.ogg", format!("payload {}", i).as_bytes())
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut names: Vec<String> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().file_name)
        .collect();
    names.sort();
    names.dedup();

    assert_eq!(names.len(), 8);
    assert_eq!(storage.list(owner).await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_delete_missing_file_is_not_found() {
    let temp = tempfile::tempdir().unwrap();
    let storage = storage(temp.path());

    let err = storage.delete(OwnerId(1), "ghost.mp3").await.unwrap_err();
    assert!(matches!(err, MediaError::NotFound(ref name) if name == "ghost.mp3"));
}

#[tokio::test]
async fn test_users_are_isolated() {
    let temp = tempfile::tempdir().unwrap();
    let storage = storage(temp.path());

    storage.save(OwnerId(1), "mine.wav", b"RIFF").await.unwrap();

    assert!(storage.list(OwnerId(2)).await.unwrap().is_empty());
    assert!(matches!(
        storage.delete(OwnerId(2), "mine.wav").await,
        Err(MediaError::NotFound(_))
    ));
    assert_eq!(storage.list(OwnerId(1)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_clear_and_total_size() {
    let temp = tempfile::tempdir().unwrap();
    let storage = storage(temp.path());
    let owner = OwnerId(5);

    storage.save(owner, "a.mp3", &[0u8; 100]).await.unwrap();
    storage.save(owner, "b.mp3", &[0u8; 250]).await.unwrap();
    assert_eq!(storage.total_size(owner).await.unwrap(), 350);

    assert_eq!(storage.clear(owner).await.unwrap(), 2);
    assert_eq!(storage.total_size(owner).await.unwrap(), 0);
    assert!(!storage.user_root(owner).exists());

    // Clearing an empty store is not an error
    assert_eq!(storage.clear(owner).await.unwrap(), 0);
}

#[tokio::test]
async fn test_save_from_path_moves_file() {
    let temp = tempfile::tempdir().unwrap();
    let storage = storage(&temp.path().join("store"));

    let source = temp.path().join("download.flac");
    std::fs::write(&source, b"fLaC").unwrap();

    let stored = storage
        .save_from_path(OwnerId(3), "download.flac", &source)
        .await
        .unwrap();

    assert!(!source.exists());
    assert_eq!(std::fs::read(&stored.path).unwrap(), b"fLaC");
}
