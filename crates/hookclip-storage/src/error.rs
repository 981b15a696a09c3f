//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage misconfigured: {0}")]
    ConfigError(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid file name: {0}")]
    InvalidKey(String),

    #[error("Range not satisfiable: {0}")]
    InvalidRange(String),

    #[error("Delivery token rejected: {0}")]
    Token(#[from] TokenError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }
}

/// Why a delivery token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Not a `payload.signature` pair, or the payload does not decode
    #[error("malformed token")]
    Malformed,

    #[error("invalid signature")]
    BadSignature,

    /// Signed for a different job, file or owner
    #[error("token does not grant access to this clip")]
    Forbidden,

    #[error("token expired")]
    Expired,
}
