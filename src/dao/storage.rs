use std::error::Error;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
///
/// Every variant is transient: the failed operation wrote nothing and may be
/// retried from the top.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be reached or rejected the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable summary of the failure.
        message: String,
        /// Backend-specific cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The transaction did not complete within the configured limit.
    #[error("storage transaction timed out")]
    Timeout,
    /// The game record changed between the read and the write of a batch.
    #[error("game `{game_id}` was modified concurrently")]
    Conflict {
        /// Game whose version did not match.
        game_id: Uuid,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
