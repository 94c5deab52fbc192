//! Typed errors for the quote extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

/// Errors that can occur while extracting a quote document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Provider is overloaded or rate limiting us. Retried by the client.
    #[error("provider temporarily unavailable: {0}")]
    Transient(String),

    /// Provider rejected the request (credentials, bad request, content rejected).
    #[error("provider rejected request: {0}")]
    Permanent(String),

    /// Transient failures persisted past the retry budget.
    #[error("provider still unavailable after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Provider answered with nothing usable (empty or safety-filtered).
    #[error("empty or blocked response: {0}")]
    EmptyResponse(String),

    /// Provider output could not be parsed into a structured result.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The uploaded document could not be read or reduced.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Referenced record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A human edit could not be applied to a line item
    #[error("invalid value for {field}: {value:?}")]
    InvalidEdit { field: String, value: String },

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

impl ExtractionError {
    /// Whether the client should retry the call that produced this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Short machine-readable label, used in logs and failed file reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient(_) | Self::RetriesExhausted { .. } => "transient",
            Self::Permanent(_) => "permanent",
            Self::EmptyResponse(_) => "empty_response",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Document(_) => "document",
            Self::Storage(_) => "storage",
            Self::NotFound { .. } => "not_found",
            Self::InvalidEdit { .. } => "invalid_edit",
            Self::Config(_) => "config",
        }
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string().into())
    }
}

/// Errors raised while inspecting or reducing a PDF document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The bytes are not a PDF we can parse.
    #[error("invalid PDF: {0}")]
    InvalidPdf(#[from] lopdf::Error),

    /// The PDF parsed but has no pages.
    #[error("document has no pages")]
    NoPages,

    /// Writing the reduced PDF failed.
    #[error("failed to write reduced PDF: {0}")]
    Write(String),
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for document operations.
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;
