use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct PendingDeletion {
    generation: u64,
    token: CancellationToken,
}

/// Deletes files after a delay, one cancelable timer per artifact name.
///
/// Scheduling a name that already has a timer replaces it, so the latest
/// download always gets the full window.
pub struct DeletionScheduler {
    pending: Arc<DashMap<String, PendingDeletion>>,
    generation: AtomicU64,
    root: CancellationToken,
}

impl DeletionScheduler {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
            root: CancellationToken::new(),
        }
    }

    /// Removes `path` after `delay` unless cancelled first.
    pub fn schedule(&self, name: &str, path: PathBuf, delay: Duration) {
        if self.root.is_cancelled() {
            tracing::debug!("Scheduler stopped, not scheduling deletion of {}", name);
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        let previous = self.pending.insert(
            name.to_string(),
            PendingDeletion {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            tracing::debug!("Rescheduled deletion of {}", name);
        }

        let pending = self.pending.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("Deferred deletion of {} cancelled", name);
                }
                _ = tokio::time::sleep(delay) => {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => tracing::info!("🗑️ Deleted after download: {}", name),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                            tracing::debug!("{} was already gone", name);
                        }
                        Err(e) => tracing::warn!("⚠️ Could not delete {}: {}", name, e),
                    }
                }
            }
            pending.remove_if(&name, |_, entry| entry.generation == generation);
        });
    }

    /// Cancels the pending deletion of `name`. Returns whether one existed.
    pub fn cancel(&self, name: &str) -> bool {
        match self.pending.remove(name) {
            Some((_, entry)) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.contains_key(name)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Cancels every pending deletion and refuses new ones.
    pub fn shutdown(&self) {
        let count = self.pending.len();
        self.root.cancel();
        self.pending.clear();
        if count > 0 {
            tracing::info!("🛑 Cancelled {} pending deletion(s)", count);
        }
    }
}

impl Default for DeletionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(tmp: &TempDir, name: &str) -> PathBuf {
        let path = tmp.path().join(name);
        std::fs::write(&path, b"%PDF").unwrap();
        path
    }

    async fn wait_until_gone(path: &std::path::Path) -> bool {
        for _ in 0..100 {
            if !path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_deletes_after_delay() {
        let tmp = TempDir::new().unwrap();
        let path = file(&tmp, "a.pdf");
        let scheduler = DeletionScheduler::new();

        scheduler.schedule("a.pdf", path.clone(), Duration::from_millis(200));
        assert!(scheduler.is_pending("a.pdf"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(path.exists());

        assert!(wait_until_gone(&path).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancel_keeps_file() {
        let tmp = TempDir::new().unwrap();
        let path = file(&tmp, "b.pdf");
        let scheduler = DeletionScheduler::new();

        scheduler.schedule("b.pdf", path.clone(), Duration::from_millis(100));
        assert!(scheduler.cancel("b.pdf"));
        assert!(!scheduler.cancel("b.pdf"));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_reschedule_extends_window() {
        let tmp = TempDir::new().unwrap();
        let path = file(&tmp, "c.pdf");
        let scheduler = DeletionScheduler::new();

        scheduler.schedule("c.pdf", path.clone(), Duration::from_millis(300));
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.schedule("c.pdf", path.clone(), Duration::from_millis(300));

        // Past the first deadline, inside the second
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(path.exists());
        assert!(scheduler.is_pending("c.pdf"));

        assert!(wait_until_gone(&path).await);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_everything() {
        let tmp = TempDir::new().unwrap();
        let first = file(&tmp, "d.pdf");
        let second = file(&tmp, "e.pdf");
        let scheduler = DeletionScheduler::new();

        scheduler.schedule("d.pdf", first.clone(), Duration::from_millis(50));
        scheduler.schedule("e.pdf", second.clone(), Duration::from_millis(50));
        scheduler.shutdown();
        assert_eq!(scheduler.pending(), 0);

        scheduler.schedule("d.pdf", first.clone(), Duration::from_millis(50));
        assert!(!scheduler.is_pending("d.pdf"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(first.exists());
        assert!(second.exists());
    }
}
