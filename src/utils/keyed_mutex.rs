use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A mutex that allows locking based on a key (e.g., user ID).
/// This prevents global locking when only user-scoped synchronization is needed.
#[derive(Debug, Clone)]
pub struct KeyedMutex<K: Eq + Hash> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedMutex<K> {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Acquires a lock for the given key.
    /// The lock is released when the returned guard is dropped.
    pub async fn lock(&self, key: &K) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        mutex.lock_owned().await
    }

    /// Removes locks that are not currently held by any task.
    /// Called periodically by the background worker to bound memory.
    pub fn cleanup(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedMutex::new();
        let guard = locks.lock(&7_i64).await;

        let contender = locks.clone();
        let attempt = tokio::time::timeout(Duration::from_millis(50), async move {
            contender.lock(&7_i64).await;
        })
        .await;
        assert!(attempt.is_err(), "second lock on the same key must wait");

        drop(guard);
        let _again = locks.lock(&7_i64).await;
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedMutex::new();
        let _a = locks.lock(&1_i64).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(&2_i64)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_entries() {
        let locks = KeyedMutex::new();
        {
            let _guard = locks.lock(&1_i64).await;
            locks.cleanup();
            assert_eq!(locks.len(), 1, "held lock must survive cleanup");
        }
        locks.cleanup();
        assert!(locks.is_empty());
    }
}
