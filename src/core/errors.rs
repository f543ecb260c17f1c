//! Error types for the conversation and preference stores.

use thiserror::Error;

/// Store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad or missing input: empty messages, missing owner, out-of-range value.
    #[error("validation error: {0}")]
    Validation(String),
    /// The referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[source] tokio_rusqlite::Error),
    /// A write reached the database after its deadline and was rolled back.
    #[error("{0}")]
    DeadlineExceeded(#[from] DeadlineExceeded),
    /// A stored row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raised inside a database call whose deadline has passed.
#[derive(Debug, Error)]
#[error("deadline passed before the write could commit")]
pub struct DeadlineExceeded;

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Other(inner) if inner.is::<DeadlineExceeded>() => {
                Self::DeadlineExceeded(DeadlineExceeded)
            }
            other => Self::TokioSqlite(other),
        }
    }
}

impl StoreError {
    /// Build a validation error from any message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Build a not-found error from any message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Whether the error comes from the storage backend rather than the caller's input.
    #[must_use]
    pub const fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(_)
                | Self::TokioSqlite(_)
                | Self::Corrupt(_)
                | Self::Serialization(_)
                | Self::Io(_)
        )
    }
}

/// Convenience result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_classification() {
        assert!(!StoreError::validation("empty").is_backend());
        assert!(!StoreError::not_found("gone").is_backend());
        assert!(!StoreError::InvalidConfig("bad".to_string()).is_backend());
        assert!(StoreError::Io(std::io::Error::other("disk")).is_backend());
        assert!(StoreError::Corrupt("bad uuid".to_string()).is_backend());
    }

    #[test]
    fn test_deadline_survives_the_connection_thread() {
        let raised = tokio_rusqlite::Error::Other(Box::new(DeadlineExceeded));
        let err = StoreError::from(raised);
        assert!(matches!(err, StoreError::DeadlineExceeded(_)));
        assert!(!err.is_backend());

        let other = tokio_rusqlite::Error::Other(Box::new(std::io::Error::other("x")));
        assert!(StoreError::from(other).is_backend());
    }

    #[test]
    fn test_display_prefixes() {
        let err = StoreError::validation("messages must not be empty");
        assert_eq!(err.to_string(), "validation error: messages must not be empty");
    }
}
