use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::config::BotConfig;
use crate::services::workspace::JobWorkspace;

const OVERWRITE_CHUNK: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a best-effort purge. Failures are informational only.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub removed: usize,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, path: &Path, error: io::Error) {
        tracing::warn!("Cleanup could not remove {}: {}", path.display(), error);
        self.failures.push(CleanupFailure {
            path: path.to_path_buf(),
            error: error.to_string(),
        });
    }
}

#[derive(Debug, Clone)]
pub struct CleanupService {
    secure_passes: u32,
}

impl CleanupService {
    pub fn new(secure_passes: u32) -> Self {
        Self { secure_passes }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.secure_delete_passes)
    }

    /// Overwrites a file with random bytes `secure_passes` times, then unlinks it.
    ///
    /// Returns `Ok(false)` when the file did not exist. If the overwrite fails
    /// the file is still unlinked.
    pub async fn secure_delete(&self, path: &Path) -> io::Result<bool> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        if metadata.is_file() && self.secure_passes > 0 && metadata.len() > 0 {
            if let Err(e) = overwrite(path, metadata.len(), self.secure_passes).await {
                tracing::warn!(
                    "Overwrite of {} failed, falling back to plain delete: {}",
                    path.display(),
                    e
                );
            }
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Removes every artifact of a job and its workspace directory.
    ///
    /// Never fails: problems end up in the report and the logs.
    pub async fn purge(&self, workspace: &mut JobWorkspace) -> CleanupReport {
        let mut report = CleanupReport::default();

        // Registered artifacts first, then whatever the tools left behind
        let mut targets: Vec<PathBuf> = workspace.artifacts().to_vec();
        if let Ok(mut entries) = tokio::fs::read_dir(workspace.path()).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if !targets.contains(&path) {
                    targets.push(path);
                }
            }
        }

        for path in &targets {
            let result = match tokio::fs::symlink_metadata(path).await {
                Ok(m) if m.is_dir() => tokio::fs::remove_dir_all(path).await.map(|_| true),
                _ => self.secure_delete(path).await,
            };
            match result {
                Ok(true) => report.removed += 1,
                Ok(false) => {}
                Err(e) => report.record_failure(path, e),
            }
        }

        match tokio::fs::remove_dir_all(workspace.path()).await {
            Ok(()) => workspace.mark_purged(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => workspace.mark_purged(),
            Err(e) => report.record_failure(workspace.path(), e),
        }

        // Fails harmlessly while other jobs of the same user are running
        let _ = tokio::fs::remove_dir(workspace.owner_dir()).await;

        if report.is_clean() {
            tracing::debug!(
                "Purged workspace {} ({} files)",
                workspace.path().display(),
                report.removed
            );
        } else {
            tracing::warn!(
                "Workspace {} purged with {} failures",
                workspace.path().display(),
                report.failures.len()
            );
        }

        report
    }

    /// Deletes temp files older than `max_age` below `temp_root` and prunes
    /// directories that were already stale before the sweep. Returns the
    /// number of files removed.
    pub async fn sweep_stale(&self, temp_root: &Path, max_age: Duration) -> usize {
        let removed = self.sweep_dir(temp_root, max_age, true).await;
        if removed > 0 {
            tracing::info!("🧹 Removed {} stale temp files", removed);
        }
        removed
    }

    #[async_recursion::async_recursion]
    async fn sweep_dir(&self, dir: &Path, max_age: Duration, is_root: bool) -> usize {
        // Read the directory age before touching children: deleting them bumps its mtime
        let dir_is_stale = match tokio::fs::metadata(dir).await {
            Ok(m) => is_older_than(&m, max_age),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Cannot inspect {}: {}", dir.display(), e);
                }
                return 0;
            }
        };

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot read {}: {}", dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Error while listing {}: {}", dir.display(), e);
                    break;
                }
            };

            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };

            if metadata.is_dir() {
                removed += self.sweep_dir(&path, max_age, false).await;
            } else if is_older_than(&metadata, max_age) {
                match self.secure_delete(&path).await {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(e) => tracing::warn!("Failed to remove stale {}: {}", path.display(), e),
                }
            }
        }

        if !is_root && dir_is_stale {
            // Only succeeds when empty
            let _ = tokio::fs::remove_dir(dir).await;
        }

        removed
    }
}

fn is_older_than(metadata: &std::fs::Metadata, max_age: Duration) -> bool {
    metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(|age| age > max_age)
        .unwrap_or(false)
}

async fn overwrite(path: &Path, len: u64, passes: u32) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    let mut rng = StdRng::from_entropy();
    let mut buffer = vec![0u8; OVERWRITE_CHUNK.min(len as usize)];

    for _ in 0..passes {
        file.seek(SeekFrom::Start(0)).await?;
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(buffer.len() as u64) as usize;
            rng.fill_bytes(&mut buffer[..n]);
            file.write_all(&buffer[..n]).await?;
            remaining -= n as u64;
        }
        file.flush().await?;
        file.sync_data().await?;
    }

    Ok(())
}
