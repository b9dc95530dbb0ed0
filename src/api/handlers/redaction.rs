use crate::AppState;
use crate::api::error::AppError;
use crate::services::pdf::RedactionBox;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
pub struct RedactRequest {
    #[validate(length(min = 1, max = 255, message = "Filename must be between 1 and 255 characters"))]
    pub filename: String,
    #[serde(default)]
    #[validate(length(max = 200, message = "Too many terms"))]
    pub terms: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RedactResponse {
    pub success: bool,
    pub pdf: String,
    pub message: String,
    pub replacements: usize,
    /// Pages where a term could still be extracted after rewriting
    pub residual_pages: Vec<u32>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct RedactSaveRequest {
    #[validate(length(min = 1, max = 255, message = "Filename must be between 1 and 255 characters"))]
    pub filename: String,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Too many redaction boxes"))]
    pub redactions: Vec<RedactionBox>,
}

#[derive(Serialize, ToSchema)]
pub struct RedactSaveResponse {
    pub success: bool,
    pub pdf: String,
    pub boxes: usize,
    pub removed_runs: usize,
}

#[utoipa::path(
    post,
    path = "/api/redact",
    request_body = RedactRequest,
    responses(
        (status = 200, description = "Redacted copy created", body = RedactResponse),
        (status = 404, description = "PDF not staged for redaction"),
        (status = 500, description = "PDF could not be processed")
    ),
    tag = "redaction"
)]
pub async fn redact_terms(
    State(state): State<AppState>,
    Json(req): Json<RedactRequest>,
) -> Result<Json<RedactResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let outcome = state.redaction.redact_terms(&req.filename, req.terms).await?;
    let report = outcome.report;

    let message = if report.residual_pages.is_empty() {
        format!("Redacted PDF created: {}", outcome.pdf)
    } else {
        tracing::warn!(
            "⚠️ Terms still extractable from {} on pages {:?}",
            outcome.pdf,
            report.residual_pages
        );
        format!(
            "Redacted PDF created: {} (terms may remain on {} page(s))",
            outcome.pdf,
            report.residual_pages.len()
        )
    };

    Ok(Json(RedactResponse {
        success: true,
        pdf: outcome.pdf,
        message,
        replacements: report.replacements,
        residual_pages: report.residual_pages,
    }))
}

#[utoipa::path(
    post,
    path = "/api/redact-save",
    request_body = RedactSaveRequest,
    responses(
        (status = 200, description = "Boxes applied", body = RedactSaveResponse),
        (status = 400, description = "Box outside the document"),
        (status = 404, description = "PDF not staged for redaction")
    ),
    tag = "redaction"
)]
pub async fn redact_save(
    State(state): State<AppState>,
    Json(req): Json<RedactSaveRequest>,
) -> Result<Json<RedactSaveResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let outcome = state
        .redaction
        .redact_boxes(&req.filename, req.redactions)
        .await?;

    Ok(Json(RedactSaveResponse {
        success: true,
        pdf: outcome.pdf,
        boxes: outcome.report.boxes,
        removed_runs: outcome.report.removed_runs,
    }))
}
