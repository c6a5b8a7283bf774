//! Error types for keel-state

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Version mismatch on key: {0}")]
    VersionMismatch(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_conflict_errors() {
        let err = StateError::AlreadyExists("plugin_route_core".to_string());
        assert_eq!(err.to_string(), "Key already exists: plugin_route_core");

        let err = StateError::VersionMismatch("plugin_route_core".to_string());
        assert_eq!(err.to_string(), "Version mismatch on key: plugin_route_core");
    }

    #[test]
    fn test_key_not_found_error() {
        let err = StateError::KeyNotFound("plugin_core".to_string());
        assert_eq!(err.to_string(), "Key not found: plugin_core");
    }

    #[test]
    fn test_from_serde_error() {
        let serde_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: StateError = serde_err.into();
        assert!(matches!(err, StateError::SerializationError(_)));
    }

    #[test]
    fn test_from_anyhow_error() {
        let anyhow_err = anyhow::anyhow!("test error");
        let err: StateError = anyhow_err.into();
        assert!(matches!(err, StateError::Other(_)));
        assert!(err.to_string().contains("test error"));
    }
}
