use crate::services::error::ServiceError;
use crate::services::sequence::parse_sequence;
use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::validation::{
    self, DOCUMENT_EXTENSIONS, IMAGE_EXTENSIONS, REDACT_EXTENSIONS, has_allowed_extension,
    is_executable_content, is_pdf_content, sanitize_filename,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::OwnedMutexGuard;
use utoipa::ToSchema;
use uuid::Uuid;

/// Name of the directory receiving generated PDFs
pub const OUTPUT_FOLDER: &str = "PDF";

/// Typed staging areas for uploaded files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Image,
    Document,
    Redact,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [StageKind::Image, StageKind::Document, StageKind::Redact];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Image => "image",
            StageKind::Document => "document",
            StageKind::Redact => "redact",
        }
    }

    pub fn folder(&self) -> &'static str {
        match self {
            StageKind::Image => "img",
            StageKind::Document => "DOC",
            StageKind::Redact => "RedactPDF",
        }
    }

    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            StageKind::Image => IMAGE_EXTENSIONS,
            StageKind::Document => DOCUMENT_EXTENSIONS,
            StageKind::Redact => REDACT_EXTENSIONS,
        }
    }

    /// Image and document uploads replace the previous batch; redaction
    /// inputs accumulate.
    pub fn replaces_on_upload(&self) -> bool {
        !matches!(self, StageKind::Redact)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(StageKind::Image),
            "document" => Ok(StageKind::Document),
            "redact" => Ok(StageKind::Redact),
            other => Err(ServiceError::InvalidType(other.to_string())),
        }
    }
}

/// Opaque handle naming the batch currently staged for a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct BatchHandle(#[schema(value_type = String)] Uuid);

impl BatchHandle {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A file received from a client, before validation
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub kind: StageKind,
    pub files: Vec<String>,
    pub batch: Option<BatchHandle>,
}

/// A generated PDF in the output directory
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ArtifactInfo {
    pub name: String,
    pub size: u64,
    pub created: DateTime<Utc>,
}

/// Filesystem-backed staging areas plus the output directory.
pub struct ArtifactStore {
    root: PathBuf,
    locks: KeyedMutex<StageKind>,
    batches: DashMap<StageKind, BatchHandle>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: KeyedMutex::new(),
            batches: DashMap::new(),
        }
    }

    /// Creates every staging directory and the output directory.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        for kind in StageKind::ALL {
            std::fs::create_dir_all(self.staging_dir(kind))?;
        }
        std::fs::create_dir_all(self.output_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_dir(&self, kind: StageKind) -> PathBuf {
        self.root.join(kind.folder())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_FOLDER)
    }

    /// Serializes work on one staging area.
    pub async fn lock(&self, kind: StageKind) -> OwnedMutexGuard<()> {
        self.locks.lock(&kind).await
    }

    /// Validates and writes `files` into the staging area of `kind`.
    ///
    /// Files failing the extension allowlist or content sniffing are dropped.
    /// Errors only when nothing survives, in which case the staging area is
    /// left untouched.
    pub async fn stage(
        &self,
        kind: StageKind,
        files: Vec<UploadedFile>,
    ) -> Result<StageOutcome, ServiceError> {
        let accepted: Vec<(String, Bytes)> = files
            .into_iter()
            .filter_map(|file| Self::accept(kind, file))
            .collect();

        if accepted.is_empty() {
            return Err(ServiceError::Validation(
                "No valid files uploaded".to_string(),
            ));
        }

        let _guard = self.lock(kind).await;
        let target = self.staging_dir(kind);
        tokio::fs::create_dir_all(&target).await?;

        if kind.replaces_on_upload() {
            self.clear(kind);
        }

        let mut stored = Vec::with_capacity(accepted.len());
        for (filename, data) in accepted {
            let path = target.join(&filename);
            tracing::info!("💾 Saving: {}", path.display());
            tokio::fs::write(&path, &data).await?;
            if !stored.contains(&filename) {
                stored.push(filename);
            }
        }

        let batch = kind.replaces_on_upload().then(|| {
            let handle = BatchHandle::fresh();
            self.batches.insert(kind, handle);
            handle
        });

        tracing::info!("✅ Uploaded to {}: {:?}", kind.folder(), stored);
        Ok(StageOutcome {
            kind,
            files: stored,
            batch,
        })
    }

    fn accept(kind: StageKind, file: UploadedFile) -> Option<(String, Bytes)> {
        if !has_allowed_extension(&file.filename, kind.allowed_extensions()) {
            tracing::debug!("Dropping {}: extension not allowed for {}", file.filename, kind);
            return None;
        }

        let filename = match sanitize_filename(&file.filename) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("Dropping {}: {}", file.filename, e);
                return None;
            }
        };

        let header = &file.data[..file.data.len().min(1024)];
        if is_executable_content(header) {
            tracing::warn!("Dropping {}: executable content", filename);
            return None;
        }
        if kind == StageKind::Redact && !is_pdf_content(header) {
            tracing::warn!("Dropping {}: not a PDF", filename);
            return None;
        }

        Some((filename, file.data))
    }

    /// Removes every regular file directly inside the staging area.
    /// Per-file failures are logged and skipped. Returns the number removed.
    pub fn clear(&self, kind: StageKind) -> usize {
        clear_folder(&self.staging_dir(kind))
    }

    /// Staged files of `kind` that pass its allowlist, sorted by name.
    pub fn staged_files(&self, kind: StageKind) -> Result<Vec<PathBuf>, ServiceError> {
        let dir = self.staging_dir(kind);
        let mut files: Vec<PathBuf> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .filter(|path| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| has_allowed_extension(n, kind.allowed_extensions()))
                })
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        files.sort();
        Ok(files)
    }

    pub fn current_batch(&self, kind: StageKind) -> Option<BatchHandle> {
        self.batches.get(&kind).map(|entry| *entry.value())
    }

    /// Rejects a handle that no longer names the batch staged for `kind`.
    pub fn check_batch(
        &self,
        kind: StageKind,
        batch: Option<BatchHandle>,
    ) -> Result<(), ServiceError> {
        match batch {
            Some(handle) if self.current_batch(kind) != Some(handle) => {
                Err(ServiceError::StaleBatch(handle.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Forgets the batch handle of `kind` once its files are consumed.
    pub fn finish_batch(&self, kind: StageKind) {
        self.batches.remove(&kind);
    }

    /// Path of an existing output artifact.
    pub fn output_path(&self, name: &str) -> Result<PathBuf, ServiceError> {
        existing_file(&self.output_dir(), name)
    }

    /// Path of an existing staged file.
    pub fn staged_path(&self, kind: StageKind, name: &str) -> Result<PathBuf, ServiceError> {
        existing_file(&self.staging_dir(kind), name)
    }

    /// Every PDF in the output directory, newest first.
    pub fn list_output(&self) -> Result<Vec<ArtifactInfo>, ServiceError> {
        let entries = match std::fs::read_dir(self.output_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut artifacts: Vec<ArtifactInfo> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                if !name.to_lowercase().ends_with(".pdf") {
                    return None;
                }
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() {
                    return None;
                }
                let created = metadata.created().or_else(|_| metadata.modified()).ok()?;
                Some(ArtifactInfo {
                    name,
                    size: metadata.len(),
                    created: DateTime::<Utc>::from(created),
                })
            })
            .collect();

        // Creation times share a second often enough that the tag breaks ties
        artifacts.sort_by(|a, b| {
            b.created
                .cmp(&a.created)
                .then_with(|| parse_sequence(&b.name).cmp(&parse_sequence(&a.name)))
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(artifacts)
    }
}

fn existing_file(dir: &Path, name: &str) -> Result<PathBuf, ServiceError> {
    if !validation::is_plain_file_name(name) {
        return Err(ServiceError::NotFound("File not found".to_string()));
    }
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ServiceError::NotFound("File not found".to_string()))
    }
}

/// Delete all regular files directly inside `dir`.
pub fn clear_folder(dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("⚠️ Could not read {}: {}", dir.display(), e);
            }
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("⚠️ Could not clear {}: {}", path.display(), e),
        }
    }
    removed
}
