use crate::AppState;
use crate::api::error::AppError;
use crate::services::convert::ItemOutcome;
use crate::services::store::{BatchHandle, StageKind, UploadedFile};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub files: Vec<String>,
    pub folder: String,
    pub count: usize,
    /// Present for image and document uploads; pass it back to `/api/convert`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchHandle>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct ConvertRequest {
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
    #[serde(rename = "baseName", default)]
    #[validate(length(max = 200, message = "Base name must be at most 200 characters"))]
    pub base_name: String,
    #[serde(default)]
    pub batch: Option<BatchHandle>,
}

#[derive(Serialize, ToSchema)]
pub struct ConvertResponse {
    pub success: bool,
    pub pdfs: Vec<String>,
    pub failed: Vec<ItemOutcome>,
    pub message: String,
}

fn default_type() -> String {
    StageKind::Image.as_str().to_string()
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = Multipart, description = "`type` (image, document or redact) and one or more `files`"),
    responses(
        (status = 200, description = "Files staged", body = UploadResponse),
        (status = 400, description = "Missing files, invalid type or nothing acceptable"),
        (status = 413, description = "Request body too large")
    ),
    tag = "staging"
)]
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut kind = default_type();
    let mut saw_files_field = false;
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "type" {
            let text = field.text().await.map_err(multipart_error)?;
            if !text.trim().is_empty() {
                kind = text.trim().to_string();
            }
        } else if name == "files" {
            saw_files_field = true;
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(multipart_error)?;
            if !filename.is_empty() {
                files.push(UploadedFile { filename, data });
            }
        }
    }

    if !saw_files_field {
        return Err(AppError::BadRequest("No files in request".to_string()));
    }
    if files.is_empty() {
        return Err(AppError::BadRequest("No files provided".to_string()));
    }

    let kind: StageKind = kind.parse()?;
    let outcome = state.store.stage(kind, files).await?;

    Ok(Json(UploadResponse {
        success: true,
        count: outcome.files.len(),
        files: outcome.files,
        folder: outcome.kind.folder().to_string(),
        batch: outcome.batch,
    }))
}

#[utoipa::path(
    post,
    path = "/api/convert",
    request_body = ConvertRequest,
    responses(
        (status = 200, description = "Batch converted", body = ConvertResponse),
        (status = 400, description = "Invalid type or nothing staged"),
        (status = 409, description = "Batch handle superseded by a newer upload")
    ),
    tag = "staging"
)]
pub async fn convert_files(
    State(state): State<AppState>,
    Json(req): Json<ConvertRequest>,
) -> Result<Json<ConvertResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let kind: StageKind = req.kind.parse()?;
    let report = state
        .pipeline
        .convert(kind, &req.base_name, req.batch)
        .await?;

    let pdfs = report.pdfs();
    Ok(Json(ConvertResponse {
        success: !pdfs.is_empty(),
        message: report.message(),
        failed: report.failures(),
        pdfs,
    }))
}
