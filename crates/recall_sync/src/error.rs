//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Every sync step is idempotent and checkpointed, so a failed round is safe
/// to re-run as a whole; [`SyncError::is_retryable`] tells callers whether
/// re-running is worthwhile without operator intervention.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (unexpected response shape or status).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server rejected the credential.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server reported an internal failure.
    #[error("server error: {0}")]
    ServerError(String),

    /// Local store error during sync.
    #[error("store error: {0}")]
    Store(#[from] recall_core::CoreError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if re-running the sync round can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::ServerError(_) => true,
            SyncError::Protocol(_)
            | SyncError::AuthenticationFailed(_)
            | SyncError::Store(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::ServerError("500".into()).is_retryable());
        assert!(!SyncError::AuthenticationFailed("bad token".into()).is_retryable());
        assert!(!SyncError::Protocol("unexpected body".into()).is_retryable());
    }
}
