//! Error types for rootwise-store

use thiserror::Error;

/// Errors surfaced by any backend port (document, blob, session, preferences).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The addressed document, file or account does not exist
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// No active session, or the session may not perform the operation
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response
    #[error("transport failed: {0}")]
    Transport(String),

    /// The backend answered with a payload we could not interpret
    #[error("malformed backend payload: {0}")]
    Decode(String),

    /// A query could not be evaluated (unknown method, bad arguments)
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The backend refused a write
    #[error("write rejected: {0}")]
    WriteRejected(String),
}

impl StorageError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        StorageError::NotFound {
            resource: resource.into(),
        }
    }

    /// Whether the failure is due to a missing or insufficient session.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, StorageError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StorageError::Decode(err.to_string())
        } else {
            StorageError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Decode(err.to_string())
    }
}
