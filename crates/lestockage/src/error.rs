//! Storage error types.

use thiserror::Error;

/// Errors raised by the storage layer and by every store contract.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row violates a model invariant
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The backing store cannot serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Create an invalid-record error
    pub fn invalid(message: impl Into<String>) -> Self {
        StorageError::InvalidRecord(message.into())
    }

    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        StorageError::Unavailable(message.into())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::invalid("both actor columns set");
        assert_eq!(err.to_string(), "Invalid record: both actor columns set");

        let err = StorageError::unavailable("connection closed");
        assert!(err.to_string().contains("connection closed"));
    }

    #[test]
    fn test_from_rusqlite() {
        let err: StorageError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, StorageError::Database(_)));
    }
}
