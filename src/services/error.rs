use thiserror::Error;

/// Failures raised by the staging, conversion, redaction and lifecycle services.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid type: {0}")]
    InvalidType(String),

    #[error("{0}")]
    NoInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Batch {0} is no longer staged")]
    StaleBatch(String),

    #[error("Error converting {file}: {reason}")]
    Conversion { file: String, reason: String },

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn conversion(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::Conversion {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<lopdf::Error> for ServiceError {
    fn from(e: lopdf::Error) -> Self {
        Self::Pdf(e.to_string())
    }
}
