//! Turns a staged batch into numbered PDF artifacts.

pub mod documents;
pub mod images;

use crate::services::error::ServiceError;
use crate::services::pdf::writer::{render_document, render_images};
use crate::services::pdf::{RasterPage, TextLayout};
use crate::services::sequence::{SequenceAllocator, artifact_name};
use crate::services::store::{ArtifactStore, BatchHandle, StageKind};
use crate::utils::validation::sanitize_base_name;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use utoipa::ToSchema;

/// What happened to one staged file.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemOutcome {
    Converted { source: String, pdf: String },
    Failed { source: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub items: Vec<ItemOutcome>,
}

impl BatchReport {
    /// Created artifacts in creation order, each listed once.
    pub fn pdfs(&self) -> Vec<String> {
        let mut pdfs: Vec<String> = Vec::new();
        for item in &self.items {
            if let ItemOutcome::Converted { pdf, .. } = item
                && !pdfs.contains(pdf)
            {
                pdfs.push(pdf.clone());
            }
        }
        pdfs
    }

    pub fn failures(&self) -> Vec<ItemOutcome> {
        self.items
            .iter()
            .filter(|item| matches!(item, ItemOutcome::Failed { .. }))
            .cloned()
            .collect()
    }

    pub fn message(&self) -> String {
        let created = self.pdfs().len();
        let failed = self.failures().len();
        match (created, failed) {
            (0, f) => format!("No PDF created; {} file(s) failed", f),
            (c, 0) => format!("Successfully created {} PDF(s)", c),
            (c, f) => format!("Successfully created {} PDF(s); {} file(s) failed", c, f),
        }
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct ConversionPipeline {
    store: Arc<ArtifactStore>,
    sequence: Arc<SequenceAllocator>,
    ffmpeg: String,
    layout: TextLayout,
}

impl ConversionPipeline {
    pub fn new(
        store: Arc<ArtifactStore>,
        sequence: Arc<SequenceAllocator>,
        ffmpeg: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sequence,
            ffmpeg: ffmpeg.into(),
            layout: TextLayout::default(),
        }
    }

    /// Converts everything staged for `kind`. The staging area is locked for
    /// the whole run and cleared afterwards even when items failed.
    pub async fn convert(
        &self,
        kind: StageKind,
        base_name: &str,
        batch: Option<BatchHandle>,
    ) -> Result<BatchReport, ServiceError> {
        if kind == StageKind::Redact {
            return Err(ServiceError::InvalidType(kind.to_string()));
        }

        let _guard = self.store.lock(kind).await;
        self.store.check_batch(kind, batch)?;

        let base = sanitize_base_name(base_name);
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || match kind {
            StageKind::Image => pipeline.convert_images(&base),
            _ => pipeline.convert_documents(&base),
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("Conversion task failed: {}", e)))?
    }

    fn finish(&self, kind: StageKind) {
        let removed = self.store.clear(kind);
        self.store.finish_batch(kind);
        tracing::debug!("Cleared {} staged file(s) from {}", removed, kind.folder());
    }

    fn write_artifact(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, ServiceError> {
        let output_dir = self.store.output_dir();
        std::fs::create_dir_all(&output_dir)?;
        let path = output_dir.join(name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    fn convert_images(&self, base: &str) -> Result<BatchReport, ServiceError> {
        let files = self.store.staged_files(StageKind::Image)?;
        if files.is_empty() {
            return Err(ServiceError::NoInput("No image files found".to_string()));
        }

        let mut report = BatchReport {
            items: Vec::with_capacity(files.len()),
        };
        let mut sources = Vec::new();
        let mut pages: Vec<RasterPage> = Vec::new();

        for path in &files {
            let source = source_name(path);
            match images::load_raster(path, &self.ffmpeg) {
                Ok(page) => {
                    sources.push(source);
                    pages.push(page);
                }
                Err(e) => {
                    tracing::warn!("⚠️ Error converting {}: {}", source, e);
                    report.items.push(ItemOutcome::Failed {
                        source,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !pages.is_empty() {
            let lease = self.sequence.reserve();
            let name = artifact_name(base, lease.value());
            let written = render_images(&pages).and_then(|bytes| self.write_artifact(&name, &bytes));
            drop(lease);

            match written {
                Ok(path) => {
                    tracing::info!("✅ Created PDF from {} image(s): {}", pages.len(), path.display());
                    report.items.extend(sources.into_iter().map(|source| ItemOutcome::Converted {
                        source,
                        pdf: name.clone(),
                    }));
                }
                Err(e) => {
                    tracing::error!("❌ Error writing {}: {}", name, e);
                    report.items.extend(sources.into_iter().map(|source| ItemOutcome::Failed {
                        source,
                        reason: e.to_string(),
                    }));
                }
            }
        }

        self.finish(StageKind::Image);
        Ok(report)
    }

    fn convert_documents(&self, base: &str) -> Result<BatchReport, ServiceError> {
        let files: Vec<PathBuf> = self
            .store
            .staged_files(StageKind::Document)?
            .into_iter()
            .filter(|path| !documents::is_skipped(&source_name(path)))
            .collect();
        if files.is_empty() {
            return Err(ServiceError::NoInput("No document files found".to_string()));
        }

        let mut report = BatchReport {
            items: Vec::with_capacity(files.len()),
        };

        for path in &files {
            let source = source_name(path);
            // A failed attempt releases its number for the next document
            let lease = self.sequence.reserve();
            let name = artifact_name(base, lease.value());

            let title = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| source.clone());
            let written = documents::extract_paragraphs(path)
                .and_then(|paragraphs| render_document(&title, &paragraphs, &self.layout))
                .and_then(|bytes| self.write_artifact(&name, &bytes));
            drop(lease);

            match written {
                Ok(_) => {
                    tracing::info!("✅ Converted {} -> {}", source, name);
                    report.items.push(ItemOutcome::Converted { source, pdf: name });
                }
                Err(e) => {
                    tracing::warn!("⚠️ Error converting {}: {}", source, e);
                    report.items.push(ItemOutcome::Failed {
                        source,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.finish(StageKind::Document);
        Ok(report)
    }
}
