// Error Handling
//
// *La Gestion des Erreurs* (The Error Management) - Engine error types

use lestockage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, ConseilError>;

/// Engine error types
#[derive(Debug, Error)]
pub enum ConseilError {
    /// A store collaborator failed
    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong
        message: String,
        /// How to fix it
        suggestion: Option<String>,
    },

    /// I/O errors with context
    #[error("I/O error: {context}")]
    Io {
        /// Operation that failed
        context: String,
        /// File involved, if any
        path: Option<PathBuf>,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ConseilError {
    /// Create a config error
    pub fn config_error(message: impl Into<String>, suggestion: Option<String>) -> Self {
        ConseilError::Config {
            message: message.into(),
            suggestion,
        }
    }

    /// Create an I/O error for a path
    pub fn io_error(
        context: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        ConseilError::Io {
            context: context.into(),
            path: Some(path.into()),
            source,
        }
    }

    /// Check if retrying the operation could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            ConseilError::Store(StorageError::Database(_)) => true,
            ConseilError::Store(StorageError::Unavailable(_)) => true,
            ConseilError::Store(_) => false,
            ConseilError::Config { .. } => false,
            ConseilError::Io { .. } => true,
        }
    }

    /// Get user-friendly suggestion for recovery
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ConseilError::Config { suggestion, .. } => suggestion.clone(),
            ConseilError::Store(StorageError::InvalidRecord(_)) => Some(
                "A stored row is malformed; inspect it or restore the database from a backup."
                    .to_string(),
            ),
            ConseilError::Store(_) => {
                Some("Check that the database file exists and is not locked.".to_string())
            }
            ConseilError::Io { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_convert() {
        let err: ConseilError = StorageError::unavailable("down").into();
        assert!(matches!(err, ConseilError::Store(_)));
        assert!(err.is_recoverable());
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_config_error_suggestion() {
        let err = ConseilError::config_error(
            "trending.window_days must be positive",
            Some("Set window_days to 1 or more.".to_string()),
        );
        assert!(!err.is_recoverable());
        assert_eq!(err.suggestion().as_deref(), Some("Set window_days to 1 or more."));
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_invalid_record_is_not_recoverable() {
        let err: ConseilError = StorageError::invalid("bad actor").into();
        assert!(!err.is_recoverable());
    }
}
