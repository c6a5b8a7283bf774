//! Model Layer Error Types

use thiserror::Error;

/// Result type for keel-model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Model layer errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Version string does not match `vMAJOR[.MINOR[.REVISION]]`
    #[error("Malformed version: {0}")]
    MalformedVersion(String),

    /// Unknown plugin status name
    #[error("Unknown plugin status: {0}")]
    UnknownStatus(String),

    /// Plugin id outside `[a-z0-9]([a-z0-9-]*[a-z0-9])?`
    #[error("Invalid plugin id: {0:?}")]
    InvalidId(String),

    /// Stored record could not be decoded
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
