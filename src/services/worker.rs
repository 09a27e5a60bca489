use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::config::BotConfig;
use crate::models::OwnerId;
use crate::services::cleanup::CleanupService;
use crate::services::sessions::Sessions;
use crate::utils::keyed_mutex::KeyedMutex;

/// Periodic housekeeping: stale temp files, abandoned sessions, idle locks.
pub struct BackgroundWorker {
    cleanup: CleanupService,
    temp_root: PathBuf,
    temp_max_age: Duration,
    interval: Duration,
    pending_ttl: Duration,
    sessions: Sessions,
    locks: KeyedMutex<OwnerId>,
    shutdown: watch::Receiver<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub temp_files: usize,
    pub pending_sessions: usize,
}

impl BackgroundWorker {
    pub fn new(
        config: &BotConfig,
        cleanup: CleanupService,
        sessions: Sessions,
        locks: KeyedMutex<OwnerId>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            cleanup,
            temp_root: config.temp_dir.clone(),
            temp_max_age: config.temp_max_age,
            interval: config.cleanup_interval,
            pending_ttl: config.pending_ttl,
            sessions,
            locks,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Background worker started (every {}s)",
            self.interval.as_secs()
        );

        // Leftovers from a previous run go first
        self.perform_cleanup().await;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    pub async fn perform_cleanup(&self) -> SweepSummary {
        tracing::debug!("🧹 Running background cleanup tasks...");

        // 1. Temp files older than the max age
        let temp_files = self
            .cleanup
            .sweep_stale(&self.temp_root, self.temp_max_age)
            .await;

        // 2. Uploads and links nobody acted on
        let pending_sessions = self.sessions.purge_expired(self.pending_ttl);

        // 3. Idle per-user locks
        self.locks.cleanup();

        tracing::debug!("✅ Background cleanup completed");

        SweepSummary {
            temp_files,
            pending_sessions,
        }
    }
}
