use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::MediaError;
use crate::models::{OwnerId, StoredFile};
use crate::services::cleanup::CleanupService;
use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::validation::validate_name;

/// Per-user permanent file store
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn save(&self, owner: OwnerId, file_name: &str, data: &[u8]) -> Result<StoredFile, MediaError>;
    /// Moves (or copies, across filesystems) an existing file into the store
    async fn save_from_path(
        &self,
        owner: OwnerId,
        file_name: &str,
        source: &Path,
    ) -> Result<StoredFile, MediaError>;
    async fn list(&self, owner: OwnerId) -> Result<Vec<StoredFile>, MediaError>;
    async fn delete(&self, owner: OwnerId, file_name: &str) -> Result<(), MediaError>;
    async fn clear(&self, owner: OwnerId) -> Result<usize, MediaError>;
    async fn total_size(&self, owner: OwnerId) -> Result<u64, MediaError>;
    fn user_root(&self, owner: OwnerId) -> PathBuf;
}

/// Files live at `<root>/<owner>/<file_name>`.
pub struct LocalStorageService {
    root: PathBuf,
    cleanup: CleanupService,
    locks: KeyedMutex<OwnerId>,
}

impl LocalStorageService {
    pub fn new(root: PathBuf, cleanup: CleanupService, locks: KeyedMutex<OwnerId>) -> Self {
        Self {
            root,
            cleanup,
            locks,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn prepare_partial(&self, owner: OwnerId) -> Result<(PathBuf, PathBuf), MediaError> {
        let dir = self.user_root(owner);
        tokio::fs::create_dir_all(&dir).await?;
        let partial = dir.join(format!(".partial-{}", Uuid::new_v4()));
        Ok((dir, partial))
    }

    /// Picks a free name and renames the partial file onto it.
    async fn finalize(
        &self,
        owner: OwnerId,
        dir: &Path,
        partial: &Path,
        file_name: &str,
    ) -> Result<StoredFile, MediaError> {
        let _guard = self.locks.lock(&owner).await;

        let mut n = 0;
        let (final_name, final_path) = loop {
            let candidate = candidate_name(file_name, n);
            let path = dir.join(&candidate);
            if !tokio::fs::try_exists(&path).await? {
                break (candidate, path);
            }
            n += 1;
        };

        tokio::fs::rename(partial, &final_path).await?;

        if final_name != file_name {
            tracing::info!("Stored {} as {} to avoid a name clash", file_name, final_name);
        }

        stored_file(owner, final_name, final_path).await
    }

    async fn discard_partial(&self, partial: &Path) {
        if let Err(e) = tokio::fs::remove_file(partial).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Could not remove partial file {}: {}", partial.display(), e);
            }
        }
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn save(&self, owner: OwnerId, file_name: &str, data: &[u8]) -> Result<StoredFile, MediaError> {
        validate_name(file_name)?;

        let (dir, partial) = self.prepare_partial(owner).await?;
        if let Err(e) = tokio::fs::write(&partial, data).await {
            self.discard_partial(&partial).await;
            return Err(e.into());
        }

        match self.finalize(owner, &dir, &partial, file_name).await {
            Ok(stored) => {
                tracing::info!("💾 Saved {} for user {} ({} bytes)", stored.file_name, owner, stored.size);
                Ok(stored)
            }
            Err(e) => {
                self.discard_partial(&partial).await;
                Err(e)
            }
        }
    }

    async fn save_from_path(
        &self,
        owner: OwnerId,
        file_name: &str,
        source: &Path,
    ) -> Result<StoredFile, MediaError> {
        validate_name(file_name)?;

        let (dir, partial) = self.prepare_partial(owner).await?;

        if let Err(rename_err) = tokio::fs::rename(source, &partial).await {
            // Different filesystem: fall back to a copy, the caller purges the source
            tracing::debug!("Rename into storage failed ({}), copying", rename_err);
            if let Err(e) = tokio::fs::copy(source, &partial).await {
                self.discard_partial(&partial).await;
                return Err(e.into());
            }
        }

        match self.finalize(owner, &dir, &partial, file_name).await {
            Ok(stored) => {
                tracing::info!("💾 Saved {} for user {} ({} bytes)", stored.file_name, owner, stored.size);
                Ok(stored)
            }
            Err(e) => {
                self.discard_partial(&partial).await;
                Err(e)
            }
        }
    }

    async fn list(&self, owner: OwnerId) -> Result<Vec<StoredFile>, MediaError> {
        let dir = self.user_root(owner);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Partial writes and anything else hidden stay invisible
            if name.starts_with('.') {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            files.push(stored_file(owner, name, entry.path()).await?);
        }

        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }

    async fn delete(&self, owner: OwnerId, file_name: &str) -> Result<(), MediaError> {
        validate_name(file_name)?;

        let path = self.user_root(owner).join(file_name);
        let _guard = self.locks.lock(&owner).await;

        if !self.cleanup.secure_delete(&path).await? {
            return Err(MediaError::NotFound(file_name.to_string()));
        }

        tracing::info!("🗑️ Deleted {} for user {}", file_name, owner);
        Ok(())
    }

    async fn clear(&self, owner: OwnerId) -> Result<usize, MediaError> {
        let files = self.list(owner).await?;
        let _guard = self.locks.lock(&owner).await;

        let mut removed = 0;
        for file in &files {
            match self.cleanup.secure_delete(&file.path).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::error!("Failed to delete {}: {}", file.path.display(), e),
            }
        }

        // Fails harmlessly if something hidden is still in there
        let _ = tokio::fs::remove_dir(self.user_root(owner)).await;

        tracing::info!("🗑️ Cleared {} files for user {}", removed, owner);
        Ok(removed)
    }

    async fn total_size(&self, owner: OwnerId) -> Result<u64, MediaError> {
        Ok(self.list(owner).await?.iter().map(|f| f.size).sum())
    }

    fn user_root(&self, owner: OwnerId) -> PathBuf {
        self.root.join(owner.to_string())
    }
}

async fn stored_file(owner: OwnerId, file_name: String, path: PathBuf) -> Result<StoredFile, MediaError> {
    let metadata = tokio::fs::metadata(&path).await?;
    let created_at = metadata
        .created()
        .or_else(|_| metadata.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(StoredFile {
        owner,
        file_name,
        path,
        size: metadata.len(),
        created_at,
    })
}

/// `clip.mp3`, `clip_1.mp3`, `clip_2.mp3`, ...
fn candidate_name(file_name: &str, n: usize) -> String {
    if n == 0 {
        return file_name.to_string();
    }

    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_name() {
        assert_eq!(candidate_name("clip.mp3", 0), "clip.mp3");
        assert_eq!(candidate_name("clip.mp3", 1), "clip_1.mp3");
        assert_eq!(candidate_name("archive.tar.gz", 2), "archive.tar_2.gz");
        assert_eq!(candidate_name("README", 3), "README_3");
    }

    #[tokio::test]
    async fn test_partial_files_are_not_listed() {
        let temp = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(
            temp.path().to_path_buf(),
            CleanupService::new(0),
            KeyedMutex::new(),
        );

        let dir = storage.user_root(OwnerId(3));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(".partial-abc"), b"half").unwrap();
        std::fs::write(dir.join("done.mp3"), b"full").unwrap();

        let files = storage.list(OwnerId(3)).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "done.mp3");
        assert_eq!(storage.total_size(OwnerId(3)).await.unwrap(), 4);
    }
}
