use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A mutex that allows locking based on a key (e.g., a staging kind).
/// Holders of different keys never wait on each other.
#[derive(Debug)]
pub struct KeyedMutex<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedMutex<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquires the lock for `key`.
    /// The lock is released when the returned guard is dropped.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the DashMap shard is not held across the await.
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        mutex.lock_owned().await
    }

    /// Returns true when some task currently holds the lock for `key`.
    pub fn is_locked(&self, key: &K) -> bool {
        self.locks
            .get(key)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self::new()
    }
}
