use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{IncomingFile, OutputFormat, OwnerId, TargetKind};
use crate::services::downloader::RemoteMediaInfo;

/// Audio job chosen from the action menu, completed by a bitrate pick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTarget {
    pub kind: TargetKind,
    pub format: OutputFormat,
}

/// Something waiting for a button press on one prompt message
pub trait Pending: Clone {
    fn prompt(&self) -> Option<i32>;
    fn set_prompt(&mut self, message_id: i32);
    fn received_at(&self) -> DateTime<Utc>;
}

/// A file the user just sent, waiting for a decision
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub file: IncomingFile,
    pub chat_id: i64,
    pub prompt_message_id: Option<i32>,
    pub rights_confirmed: bool,
    /// Set when the user opened the bitrate menu
    pub awaiting: Option<AudioTarget>,
    pub received_at: DateTime<Utc>,
}

impl PendingUpload {
    pub fn new(file: IncomingFile, chat_id: i64) -> Self {
        Self {
            file,
            chat_id,
            prompt_message_id: None,
            rights_confirmed: false,
            awaiting: None,
            received_at: Utc::now(),
        }
    }
}

impl Pending for PendingUpload {
    fn prompt(&self) -> Option<i32> {
        self.prompt_message_id
    }

    fn set_prompt(&mut self, message_id: i32) {
        self.prompt_message_id = Some(message_id);
    }

    fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// A link the user sent, waiting for a format pick
#[derive(Debug, Clone)]
pub struct PendingLink {
    pub url: String,
    pub info: RemoteMediaInfo,
    pub chat_id: i64,
    pub prompt_message_id: Option<i32>,
    pub received_at: DateTime<Utc>,
}

impl PendingLink {
    pub fn new(url: String, info: RemoteMediaInfo, chat_id: i64) -> Self {
        Self {
            url,
            info,
            chat_id,
            prompt_message_id: None,
            received_at: Utc::now(),
        }
    }
}

impl Pending for PendingLink {
    fn prompt(&self) -> Option<i32> {
        self.prompt_message_id
    }

    fn set_prompt(&mut self, message_id: i32) {
        self.prompt_message_id = Some(message_id);
    }

    fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// One pending entry per user; a new one replaces the previous.
///
/// Every button press names the prompt message it came from. Lookups that
/// take a prompt id only match the entry created for that prompt, so an old
/// keyboard can never act on a newer upload.
#[derive(Debug)]
pub struct PendingMap<T> {
    inner: Arc<DashMap<OwnerId, T>>,
}

impl<T> Clone for PendingMap<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for PendingMap<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }
}

pub type PendingUploads = PendingMap<PendingUpload>;
pub type PendingLinks = PendingMap<PendingLink>;

impl<T: Pending> PendingMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, owner: OwnerId, entry: T) {
        if self.inner.insert(owner, entry).is_some() {
            tracing::debug!("Replaced pending entry for user {}", owner);
        }
    }

    pub fn get(&self, owner: OwnerId) -> Option<T> {
        self.inner.get(&owner).map(|entry| entry.value().clone())
    }

    /// The entry, if it belongs to `prompt`
    pub fn get_for_prompt(&self, owner: OwnerId, prompt: i32) -> Option<T> {
        self.get(owner).filter(|entry| entry.prompt() == Some(prompt))
    }

    /// Applies `f` to the entry of `prompt`, if any, and returns the updated copy
    pub fn update<F>(&self, owner: OwnerId, prompt: i32, f: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        let mut entry = self.inner.get_mut(&owner)?;
        if entry.prompt() != Some(prompt) {
            return None;
        }
        f(entry.value_mut());
        Some(entry.value().clone())
    }

    /// Binds the entry to the prompt message that was just sent for it
    pub fn set_prompt(&self, owner: OwnerId, message_id: i32) {
        if let Some(mut entry) = self.inner.get_mut(&owner) {
            entry.set_prompt(message_id);
        }
    }

    /// Removes and returns the entry of `prompt`, handing it to a job
    pub fn take(&self, owner: OwnerId, prompt: i32) -> Option<T> {
        self.inner
            .remove_if(&owner, |_, entry| entry.prompt() == Some(prompt))
            .map(|(_, entry)| entry)
    }

    /// Removes the entry of `prompt`; a newer entry is left alone
    pub fn remove(&self, owner: OwnerId, prompt: i32) -> bool {
        self.take(owner, prompt).is_some()
    }

    /// Drops entries older than `ttl`, returns how many were dropped
    pub fn purge_expired(&self, ttl: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return 0;
        };
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.received_at() >= cutoff);
        before.saturating_sub(self.inner.len())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl PendingUploads {
    pub fn confirm_rights(&self, owner: OwnerId, prompt: i32) -> Option<PendingUpload> {
        self.update(owner, prompt, |upload| upload.rights_confirmed = true)
    }

    pub fn set_awaiting(
        &self,
        owner: OwnerId,
        prompt: i32,
        target: Option<AudioTarget>,
    ) -> Option<PendingUpload> {
        self.update(owner, prompt, |upload| upload.awaiting = target)
    }
}

/// Everything waiting on a user's button press
#[derive(Debug, Clone, Default)]
pub struct Sessions {
    pub uploads: PendingUploads,
    pub links: PendingLinks,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops abandoned uploads and links, returns how many were dropped
    pub fn purge_expired(&self, ttl: Duration) -> usize {
        let removed = self.uploads.purge_expired(ttl) + self.links.purge_expired(ttl);
        if removed > 0 {
            tracing::info!("⌛ Dropped {} abandoned sessions", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str) -> PendingUpload {
        PendingUpload::new(
            IncomingFile {
                file_id: format!("id-{}", name),
                file_name: name.to_string(),
                mime_type: None,
                size: 10,
            },
            99,
        )
    }

    fn link(url: &str) -> PendingLink {
        PendingLink::new(
            url.to_string(),
            RemoteMediaInfo {
                title: "Clip".to_string(),
                uploader: "Someone".to_string(),
                duration_secs: 1.0,
                view_count: None,
                platform: "Youtube".to_string(),
            },
            99,
        )
    }

    #[test]
    fn test_insert_replaces_previous() {
        let pending = PendingUploads::new();
        pending.insert(OwnerId(1), upload("a.mp4"));
        pending.insert(OwnerId(1), upload("b.mp4"));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.get(OwnerId(1)).unwrap().file.file_name, "b.mp4");
    }

    #[test]
    fn test_confirm_and_take() {
        let pending = PendingUploads::new();
        assert!(pending.confirm_rights(OwnerId(1), 5).is_none());

        pending.insert(OwnerId(1), upload("a.mp4"));
        pending.set_prompt(OwnerId(1), 5);
        assert!(pending.confirm_rights(OwnerId(1), 5).unwrap().rights_confirmed);

        let taken = pending.take(OwnerId(1), 5).unwrap();
        assert_eq!(taken.prompt_message_id, Some(5));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_stale_prompt_cannot_touch_newer_upload() {
        let pending = PendingUploads::new();
        pending.insert(OwnerId(1), upload("a.mp4"));
        pending.set_prompt(OwnerId(1), 5);

        // b.mp4 replaces a.mp4 before its keyboard was used
        pending.insert(OwnerId(1), upload("b.mp4"));
        pending.set_prompt(OwnerId(1), 6);

        assert!(pending.get_for_prompt(OwnerId(1), 5).is_none());
        assert!(pending.confirm_rights(OwnerId(1), 5).is_none());
        assert!(pending.set_awaiting(OwnerId(1), 5, None).is_none());
        assert!(pending.take(OwnerId(1), 5).is_none());
        assert!(!pending.remove(OwnerId(1), 5));

        let current = pending.get(OwnerId(1)).unwrap();
        assert_eq!(current.file.file_name, "b.mp4");
        assert!(!current.rights_confirmed);

        assert_eq!(pending.take(OwnerId(1), 6).unwrap().file.file_name, "b.mp4");
    }

    #[test]
    fn test_entry_without_prompt_is_unreachable_from_buttons() {
        let pending = PendingUploads::new();
        pending.insert(OwnerId(1), upload("a.mp4"));
        assert!(pending.take(OwnerId(1), 0).is_none());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let sessions = Sessions::new();
        let mut old = upload("old.mp4");
        old.received_at = Utc::now() - chrono::Duration::hours(2);
        sessions.uploads.insert(OwnerId(1), old);
        sessions.uploads.insert(OwnerId(2), upload("new.mp4"));

        let mut old_link = link("https://youtu.be/a");
        old_link.received_at = Utc::now() - chrono::Duration::hours(2);
        sessions.links.insert(OwnerId(1), old_link);

        assert_eq!(sessions.purge_expired(Duration::from_secs(3600)), 2);
        assert!(sessions.uploads.get(OwnerId(1)).is_none());
        assert!(sessions.uploads.get(OwnerId(2)).is_some());
        assert!(sessions.links.is_empty());
    }
}
