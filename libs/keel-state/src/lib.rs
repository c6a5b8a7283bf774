//! keel State Store Abstraction
//!
//! Provides an etag-guarded key-value interface for control-plane records,
//! supporting multiple backends (Redis, in-memory).
//!
//! # Key Components
//!
//! - **StateStore trait**: create / update (CAS) / get / list / delete
//! - **MemoryStateStore**: DashMap backend with TTL support
//! - **RedisStateStore**: Redis backend using Lua scripts for atomic CAS
//! - **watch_prefix**: polling watch delivering snapshots on change

pub mod error;
pub mod traits;
pub mod watch;

#[cfg(feature = "redis-backend")]
pub mod redis_impl;

pub mod memory_impl;

// Re-exports
pub use bytes::Bytes;
pub use error::{Result, StateError};
pub use traits::{encode, StateItem, StateStore};
pub use watch::watch_prefix;

#[cfg(feature = "redis-backend")]
pub use redis_impl::RedisStateStore;

pub use memory_impl::{MemoryStateStore, MemoryStats};

/// Helper functions for common operations
pub mod helpers {
    use super::{MemoryStateStore, StateStore};
    use std::sync::Arc;

    // ==================== Test Support ====================

    /// Create an in-memory state store for unit testing
    ///
    /// ```
    /// use keel_state::helpers::create_test_store;
    ///
    /// let store = create_test_store();
    /// ```
    pub fn create_test_store() -> Arc<dyn StateStore> {
        Arc::new(MemoryStateStore::new())
    }

    /// Create a concrete MemoryStateStore for unit testing
    pub fn create_test_memory_store() -> Arc<MemoryStateStore> {
        Arc::new(MemoryStateStore::new())
    }
}
