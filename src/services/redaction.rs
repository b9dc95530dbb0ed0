use crate::services::error::ServiceError;
use crate::services::pdf::redact::{self, BoxReport, RedactionBox, TermReport};
use crate::services::pdf::writer::save_document;
use crate::services::sequence::{SequenceAllocator, artifact_name};
use crate::services::store::{ArtifactStore, StageKind};
use lopdf::Document;
use std::path::Path;
use std::sync::Arc;

const TERM_PREFIX: &str = "redacted";
const MANUAL_PREFIX: &str = "manual_redacted";

#[derive(Debug, Clone)]
pub struct TermRedactionOutcome {
    pub pdf: String,
    pub report: TermReport,
}

#[derive(Debug, Clone)]
pub struct BoxRedactionOutcome {
    pub pdf: String,
    pub report: BoxReport,
}

/// Produces redacted copies of PDFs waiting in the redaction staging area.
#[derive(Clone)]
pub struct RedactionService {
    store: Arc<ArtifactStore>,
    sequence: Arc<SequenceAllocator>,
}

impl RedactionService {
    pub fn new(store: Arc<ArtifactStore>, sequence: Arc<SequenceAllocator>) -> Self {
        Self { store, sequence }
    }

    /// Replaces `terms` with the placeholder. The source is consumed on success.
    pub async fn redact_terms(
        &self,
        filename: &str,
        terms: Vec<String>,
    ) -> Result<TermRedactionOutcome, ServiceError> {
        let _guard = self.store.lock(StageKind::Redact).await;
        let source = self.store.staged_path(StageKind::Redact, filename)?;

        let service = self.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut doc = load(&source)?;
            let report = redact::redact_terms(&mut doc, &terms)?;
            let pdf = service.write(TERM_PREFIX, &mut doc)?;

            if let Err(e) = std::fs::remove_file(&source) {
                tracing::warn!("⚠️ Could not remove original {}: {}", source.display(), e);
            }
            Ok::<_, ServiceError>(TermRedactionOutcome { pdf, report })
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("Redaction task failed: {}", e)))??;

        tracing::info!(
            "✅ Redacted PDF created: {} ({} replacement(s))",
            outcome.pdf,
            outcome.report.replacements
        );
        Ok(outcome)
    }

    /// Applies editor boxes. The source stays staged for further passes.
    pub async fn redact_boxes(
        &self,
        filename: &str,
        boxes: Vec<RedactionBox>,
    ) -> Result<BoxRedactionOutcome, ServiceError> {
        let _guard = self.store.lock(StageKind::Redact).await;
        let source = self.store.staged_path(StageKind::Redact, filename)?;

        let service = self.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut doc = load(&source)?;
            let report = redact::redact_boxes(&mut doc, &boxes)?;
            let pdf = service.write(MANUAL_PREFIX, &mut doc)?;
            Ok::<_, ServiceError>(BoxRedactionOutcome { pdf, report })
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("Redaction task failed: {}", e)))??;

        tracing::info!(
            "✅ Manual redaction saved: {} ({} box(es))",
            outcome.pdf,
            outcome.report.boxes
        );
        Ok(outcome)
    }

    fn write(&self, prefix: &str, doc: &mut Document) -> Result<String, ServiceError> {
        let bytes = save_document(doc)?;
        let lease = self.sequence.reserve();
        let name = artifact_name(prefix, lease.value());

        let output_dir = self.store.output_dir();
        std::fs::create_dir_all(&output_dir)?;
        std::fs::write(output_dir.join(&name), bytes)?;
        Ok(name)
    }
}

fn load(path: &Path) -> Result<Document, ServiceError> {
    Document::load(path).map_err(|e| {
        tracing::error!("❌ Redaction error on {}: {}", path.display(), e);
        ServiceError::Pdf(format!("Could not read PDF: {}", e))
    })
}
