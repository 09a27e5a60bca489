use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::MediaError;
use crate::models::OwnerId;

const CREATE_ATTEMPTS: u32 = 5;
const MAX_ARTIFACT_EXTENSION_LEN: usize = 16;

/// Private working directory of a single job: `<temp_root>/<owner>/<job_id>/`.
///
/// Every temp file a job touches is allocated here. The Cleanup Service purges
/// it when the job ends; if the handle is dropped first (task aborted, panic,
/// shutdown) the directory is removed synchronously on drop.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: PathBuf,
    owner_dir: PathBuf,
    artifacts: Vec<PathBuf>,
    purged: bool,
}

impl JobWorkspace {
    pub async fn create(temp_root: &Path, owner: OwnerId, job_id: Uuid) -> Result<Self, MediaError> {
        let owner_dir = temp_root.join(owner.to_string());
        let dir = owner_dir.join(job_id.to_string());

        // A sibling job may remove the owner directory between our mkdir calls
        let mut attempt = 1;
        loop {
            match tokio::fs::create_dir_all(&dir).await {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && attempt < CREATE_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!("Created job workspace {}", dir.display());

        Ok(Self {
            dir,
            owner_dir,
            artifacts: Vec::new(),
            purged: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn owner_dir(&self) -> &Path {
        &self.owner_dir
    }

    /// Allocates and registers a temp file path `<role>.<ext>` inside the workspace.
    ///
    /// Only the extension of `name` is kept, so user supplied names never
    /// reach the filesystem and their length does not matter.
    pub fn artifact(&mut self, role: &str, name: &str) -> PathBuf {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| {
                !e.is_empty()
                    && e.len() <= MAX_ARTIFACT_EXTENSION_LEN
                    && e.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .map(|e| e.to_ascii_lowercase());

        let file_name = match extension {
            Some(ext) => format!("{}.{}", role, ext),
            None => role.to_string(),
        };
        self.adopt(self.dir.join(file_name))
    }

    /// Registers a file some external tool wrote into the workspace.
    pub fn adopt(&mut self, path: PathBuf) -> PathBuf {
        self.artifacts.push(path.clone());
        path
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    pub fn is_purged(&self) -> bool {
        self.purged
    }

    pub(crate) fn mark_purged(&mut self) {
        self.purged = true;
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.purged {
            return;
        }

        tracing::warn!(
            "Job workspace {} dropped without purge, removing",
            self.dir.display()
        );
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!("Failed to remove workspace {}: {}", self.dir.display(), e);
            }
        }
        // Only succeeds when no sibling job is using the owner directory
        let _ = std::fs::remove_dir(&self.owner_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_workspace_layout() {
        let temp = tempfile::tempdir().unwrap();
        let job_id = Uuid::new_v4();
        let mut ws = JobWorkspace::create(temp.path(), OwnerId(42), job_id)
            .await
            .unwrap();

        assert_eq!(ws.path(), temp.path().join("42").join(job_id.to_string()));
        assert!(ws.path().is_dir());

        let input = ws.artifact("source", "../../evil/clip.MKV");
        assert_eq!(input, ws.path().join("source.mkv"));
        assert_eq!(ws.artifacts().len(), 1);

        let long = format!("{}.mp3", "x".repeat(300));
        assert_eq!(ws.artifact("output", &long), ws.path().join("output.mp3"));
        assert_eq!(ws.artifact("output", "noext"), ws.path().join("output"));
        assert_eq!(ws.artifact("output", "a.m p3"), ws.path().join("output"));

        ws.mark_purged();
    }

    #[tokio::test]
    async fn test_drop_without_purge_removes_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = {
            let mut ws = JobWorkspace::create(temp.path(), OwnerId(7), Uuid::new_v4())
                .await
                .unwrap();
            let artifact = ws.artifact("output", "clip.mp3");
            std::fs::write(&artifact, b"partial").unwrap();
            ws.path().to_path_buf()
        };

        assert!(!dir.exists());
        assert!(!temp.path().join("7").exists());
    }

    #[tokio::test]
    async fn test_concurrent_create_and_purge_for_same_owner() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_path_buf();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let root = root.clone();
                tokio::spawn(async move {
                    for _ in 0..20 {
                        let mut ws = JobWorkspace::create(&root, OwnerId(3), Uuid::new_v4())
                            .await
                            .unwrap();
                        std::fs::write(ws.artifact("source", "a.mp3"), b"x").unwrap();
                        // Drop removes the job dir and tries the owner dir
                        drop(ws);
                    }
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }
        assert!(!root.join("3").exists());
    }
}
