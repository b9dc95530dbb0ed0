use crate::AppState;
use crate::api::error::AppError;
use crate::services::store::ArtifactInfo;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct PdfListResponse {
    pub pdfs: Vec<ArtifactInfo>,
}

#[derive(Serialize, ToSchema)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Copy)]
pub(crate) enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    fn as_str(&self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// Builds a `Content-Disposition` value with an ASCII fallback and an
/// RFC 5987 encoded name.
pub(crate) fn content_disposition(disposition: Disposition, filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition.as_str(),
        fallback_filename,
        encoded_filename
    )
}

fn pdf_response(
    filename: &str,
    bytes: Vec<u8>,
    disposition: Disposition,
) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime::APPLICATION_PDF.as_ref())
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(disposition, filename),
        )
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

#[utoipa::path(
    get,
    path = "/api/pdfs",
    responses(
        (status = 200, description = "Generated PDFs, newest first", body = PdfListResponse)
    ),
    tag = "artifacts"
)]
pub async fn list_pdfs(State(state): State<AppState>) -> Result<Json<PdfListResponse>, AppError> {
    let pdfs = state.lifecycle.list()?;
    Ok(Json(PdfListResponse { pdfs }))
}

#[utoipa::path(
    delete,
    path = "/api/delete/{filename}",
    params(("filename" = String, Path, description = "Artifact name")),
    responses(
        (status = 200, description = "Artifact deleted", body = ActionResponse),
        (status = 404, description = "File not found")
    ),
    tag = "artifacts"
)]
pub async fn delete_pdf(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    state.lifecycle.delete(&filename).await?;
    Ok(Json(ActionResponse {
        success: true,
        message: None,
    }))
}

#[utoipa::path(
    get,
    path = "/api/download/{filename}",
    params(("filename" = String, Path, description = "Artifact name")),
    responses(
        (status = 200, description = "PDF attachment; the artifact is removed shortly after", content_type = "application/pdf"),
        (status = 404, description = "File not found")
    ),
    tag = "artifacts"
)]
pub async fn download_pdf(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let bytes = state.lifecycle.download(&filename).await?;
    pdf_response(&filename, bytes, Disposition::Attachment)
}

#[utoipa::path(
    get,
    path = "/api/open/{filename}",
    params(("filename" = String, Path, description = "Artifact name")),
    responses(
        (status = 200, description = "Viewer launched", body = ActionResponse),
        (status = 404, description = "File not found")
    ),
    tag = "artifacts"
)]
pub async fn open_pdf(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    state.lifecycle.open(&filename).await?;
    Ok(Json(ActionResponse {
        success: true,
        message: Some(format!("Opening {}", filename)),
    }))
}

#[utoipa::path(
    get,
    path = "/pdf/{filename}",
    params(("filename" = String, Path, description = "Artifact name")),
    responses(
        (status = 200, description = "PDF attachment", content_type = "application/pdf"),
        (status = 404, description = "File not found")
    ),
    tag = "artifacts"
)]
pub async fn serve_pdf(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let bytes = state.lifecycle.serve(&filename).await?;
    pdf_response(&filename, bytes, Disposition::Attachment)
}

#[utoipa::path(
    get,
    path = "/RedactPDF/{filename}",
    params(("filename" = String, Path, description = "PDF staged for redaction")),
    responses(
        (status = 200, description = "PDF shown inline", content_type = "application/pdf"),
        (status = 404, description = "File not found")
    ),
    tag = "redaction"
)]
pub async fn serve_staged_pdf(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let bytes = state.lifecycle.staged_pdf(&filename).await?;
    pdf_response(&filename, bytes, Disposition::Inline)
}
