//! Error types for the retrieval and orchestration core.
//!
//! Library operations return [`Result<T>`]. The binary and configuration
//! loading use `anyhow` on top of these.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by ingestion, retrieval, and query orchestration.
#[derive(Debug, Error)]
pub enum Error {
    /// The document is missing a required header or is otherwise malformed.
    #[error("Failed to parse course document: {reason}")]
    Parse { reason: String },

    /// The embedding backend could not produce vectors.
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// The vector store rejected or failed an operation.
    #[error("Vector store error: {0}")]
    Store(String),

    /// The generation backend failed or timed out.
    #[error("Generation service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The caller supplied an unusable request (empty query, bad tool arguments).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The backend asked for a tool that is not registered.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Whether the caller should treat this as a transient upstream outage.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::ServiceUnavailable(format!("request timed out: {}", err))
        } else {
            Self::ServiceUnavailable(err.to_string())
        }
    }
}
