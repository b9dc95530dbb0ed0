use crate::services::error::ServiceError;
use crate::services::scheduler::DeletionScheduler;
use crate::services::store::{ArtifactInfo, ArtifactStore, StageKind};
use crate::services::viewer::Viewer;
use std::sync::Arc;
use std::time::Duration;

/// List, serve, open and delete generated artifacts.
pub struct ArtifactLifecycle {
    store: Arc<ArtifactStore>,
    viewer: Arc<dyn Viewer>,
    scheduler: DeletionScheduler,
    download_ttl: Duration,
}

impl ArtifactLifecycle {
    pub fn new(store: Arc<ArtifactStore>, viewer: Arc<dyn Viewer>, download_ttl: Duration) -> Self {
        Self {
            store,
            viewer,
            scheduler: DeletionScheduler::new(),
            download_ttl,
        }
    }

    pub fn list(&self) -> Result<Vec<ArtifactInfo>, ServiceError> {
        self.store.list_output()
    }

    pub async fn delete(&self, name: &str) -> Result<(), ServiceError> {
        let path = self.store.output_path(name)?;
        if self.scheduler.cancel(name) {
            tracing::debug!("Cancelled deferred deletion of {}", name);
        }
        tokio::fs::remove_file(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ServiceError::NotFound("File not found".to_string()),
            _ => ServiceError::Io(e),
        })?;
        tracing::info!("🗑️ Deleted: {}", name);
        Ok(())
    }

    /// Returns the artifact bytes and schedules its deletion after the
    /// download window. A repeat download inside the window restarts it.
    pub async fn download(&self, name: &str) -> Result<Vec<u8>, ServiceError> {
        let path = self.store.output_path(name)?;
        let bytes = read_existing(&path).await?;
        self.scheduler.schedule(name, path, self.download_ttl);
        tracing::info!(
            "📥 Download of {}, deleting in {}s",
            name,
            self.download_ttl.as_secs()
        );
        Ok(bytes)
    }

    /// Artifact bytes, file left in place.
    pub async fn serve(&self, name: &str) -> Result<Vec<u8>, ServiceError> {
        let path = self.store.output_path(name)?;
        read_existing(&path).await
    }

    /// A PDF waiting in the redaction staging area.
    pub async fn staged_pdf(&self, name: &str) -> Result<Vec<u8>, ServiceError> {
        let path = self.store.staged_path(StageKind::Redact, name)?;
        read_existing(&path).await
    }

    pub fn is_staged_for_redaction(&self, name: &str) -> bool {
        self.store.staged_path(StageKind::Redact, name).is_ok()
    }

    pub async fn open(&self, name: &str) -> Result<(), ServiceError> {
        let path = self.store.output_path(name)?;
        self.viewer.open(&path).await?;
        tracing::info!("📂 Opened {} with {} viewer", name, self.viewer.name());
        Ok(())
    }

    pub fn pending_deletions(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

async fn read_existing(path: &std::path::Path) -> Result<Vec<u8>, ServiceError> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ServiceError::NotFound("File not found".to_string()),
        _ => ServiceError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::viewer::NoOpViewer;
    use tempfile::TempDir;

    fn lifecycle(ttl: Duration) -> (TempDir, Arc<ArtifactStore>, Arc<NoOpViewer>, ArtifactLifecycle) {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::new(tmp.path()));
        store.ensure_layout().unwrap();
        let viewer = Arc::new(NoOpViewer::default());
        let lifecycle = ArtifactLifecycle::new(store.clone(), viewer.clone(), ttl);
        (tmp, store, viewer, lifecycle)
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_tmp, _store, _viewer, lifecycle) = lifecycle(Duration::from_secs(60));
        assert!(matches!(
            lifecycle.delete("nope.pdf").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            lifecycle.delete("../etc/passwd").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_serve_keeps_file() {
        let (_tmp, store, _viewer, lifecycle) = lifecycle(Duration::from_millis(50));
        let path = store.output_dir().join("a[1]_t.pdf");
        std::fs::write(&path, b"%PDF-1.5").unwrap();

        assert_eq!(lifecycle.serve("a[1]_t.pdf").await.unwrap(), b"%PDF-1.5");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(path.exists());
        assert_eq!(lifecycle.pending_deletions(), 0);
    }

    #[tokio::test]
    async fn test_download_then_explicit_delete_cancels_timer() {
        let (_tmp, store, _viewer, lifecycle) = lifecycle(Duration::from_secs(60));
        std::fs::write(store.output_dir().join("b[1]_t.pdf"), b"%PDF").unwrap();

        lifecycle.download("b[1]_t.pdf").await.unwrap();
        assert_eq!(lifecycle.pending_deletions(), 1);

        lifecycle.delete("b[1]_t.pdf").await.unwrap();
        assert_eq!(lifecycle.pending_deletions(), 0);
        assert!(lifecycle.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_uses_viewer() {
        let (_tmp, store, viewer, lifecycle) = lifecycle(Duration::from_secs(60));
        let path = store.output_dir().join("c[1]_t.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        lifecycle.open("c[1]_t.pdf").await.unwrap();
        assert_eq!(viewer.opened(), vec![path]);
        assert!(matches!(
            lifecycle.open("missing.pdf").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_staged_pdf_reads_redaction_input() {
        let (_tmp, store, _viewer, lifecycle) = lifecycle(Duration::from_secs(60));
        std::fs::write(store.staging_dir(StageKind::Redact).join("in.pdf"), b"%PDF").unwrap();

        assert!(lifecycle.is_staged_for_redaction("in.pdf"));
        assert!(!lifecycle.is_staged_for_redaction("other.pdf"));
        assert_eq!(lifecycle.staged_pdf("in.pdf").await.unwrap(), b"%PDF");
    }
}
