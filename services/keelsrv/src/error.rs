//! Translation of leaf-crate errors into `KeelError`

pub use errors::{KeelError, KeelResult};
use keel_model::ModelError;
use keel_state::StateError;

/// Map a state store error onto the service taxonomy
pub fn store_err(err: StateError) -> KeelError {
    match err {
        StateError::AlreadyExists(key) => KeelError::AlreadyExists(key),
        StateError::VersionMismatch(key) => KeelError::VersionMismatch { key },
        StateError::KeyNotFound(key) => KeelError::not_found(key),
        StateError::SerializationError(msg) => {
            KeelError::InternalStore(format!("corrupt record: {}", msg))
        },
        StateError::ConnectionError(msg) => KeelError::InternalStore(msg),
        StateError::Other(e) => KeelError::InternalStore(format!("{:#}", e)),
    }
}

/// Map a model error onto the service taxonomy
pub fn model_err(err: ModelError) -> KeelError {
    match err {
        ModelError::MalformedVersion(v) => KeelError::MalformedVersion(v),
        ModelError::InvalidId(id) => KeelError::InvalidArgument(format!("invalid plugin id {:?}", id)),
        ModelError::UnknownStatus(s) => KeelError::InvalidArgument(format!("unknown status {}", s)),
        ModelError::Codec(msg) => KeelError::Serialization(msg),
    }
}
