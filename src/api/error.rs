use crate::services::error::ServiceError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::InvalidType(_) => AppError::BadRequest(e.to_string()),
            ServiceError::NoInput(msg) | ServiceError::Validation(msg) => {
                AppError::BadRequest(msg)
            }
            ServiceError::NotFound(msg) => AppError::NotFound(msg),
            ServiceError::StaleBatch(_) => AppError::Conflict(e.to_string()),
            ServiceError::Conversion { .. } | ServiceError::Pdf(_) | ServiceError::Io(_) => {
                AppError::Internal(e.to_string())
            }
            ServiceError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
