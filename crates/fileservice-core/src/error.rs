//! Unified error type for the file service.
//!
//! All fallible storage operations return `Result<T, FileServiceError>`.
//! Best-effort operations (bulk listing, deletes, directory clean/copy)
//! never surface these values; they log them and carry on.

use thiserror::Error;

/// The unified error type for all file service operations.
#[derive(Error, Debug)]
pub enum FileServiceError {
    /// A local disk or network I/O operation failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The requested path or key does not exist.
    #[error("Not found: {path}")]
    NotFound {
        /// The storage path that was not found.
        path: String,
    },

    /// Invalid configuration, or a backend that cannot start with it.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },

    /// An internal error (bug).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl FileServiceError {
    /// Create a storage error from a message and source error.
    pub fn storage(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a storage error from a message only.
    pub fn storage_msg(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a not-found error for a storage path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` if this error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
