//! Error taxonomy for the RootWise core.

use rootwise_store::StorageError;

/// Core errors.
///
/// `PermissionDenied` and `Validation` are handled where they occur and
/// never reach the network. `Network`, `Server` and `Persistence` revert
/// the pipeline one stage. `Auth` degrades reads and fails writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {status}: {reason}")]
    Server { status: u16, reason: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("authentication required: {0}")]
    Auth(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("media unreadable: {0}")]
    MediaUnreadable(String),
}

impl CoreError {
    pub fn is_auth(&self) -> bool {
        matches!(self, CoreError::Auth(_))
    }

    /// Map a failed write. Anything but a missing session is a persistence failure.
    pub fn from_write(err: StorageError) -> Self {
        match err {
            StorageError::Unauthorized(msg) => CoreError::Auth(msg),
            other => CoreError::Persistence(other.to_string()),
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unauthorized(msg) => CoreError::Auth(msg),
            StorageError::NotFound { resource } => CoreError::NotFound(resource),
            StorageError::Transport(msg) => CoreError::Network(msg),
            StorageError::Decode(msg) => CoreError::MalformedResponse(msg),
            StorageError::Http { status, body } => CoreError::Server {
                status,
                reason: body,
            },
            other => CoreError::Persistence(other.to_string()),
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Treat a missing session on a read as "no data yet".
pub fn degrade_auth<T: Default>(result: CoreResult<T>) -> CoreResult<T> {
    match result {
        Err(CoreError::Auth(msg)) => {
            tracing::warn!(reason = %msg, "read without session, returning empty result");
            Ok(T::default())
        }
        other => other,
    }
}
