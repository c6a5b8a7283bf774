//! Trait definitions for the state store abstraction

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::time::Duration;

/// One stored value with its concurrency token
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateItem {
    pub key: String,
    pub value: Bytes,
    /// Empty when the key is absent
    pub etag: String,
}

impl StateItem {
    pub fn absent(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Bytes::new(),
            etag: String::new(),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.etag.is_empty()
    }

    /// Decode the JSON value, `None` when the key is absent
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if self.is_absent() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&self.value)?))
    }
}

/// Encode a record for storage
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Key-value store with first-write-wins concurrency
///
/// Every key carries an etag. Writers that present a stale etag lose.
/// Etags are never reused for a key, including after delete and recreate.
///
/// Implementations:
/// - `RedisStateStore`: production backend (Lua scripts for atomic CAS)
/// - `MemoryStateStore`: in-process backend for tests and single-node setups
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    // ========== Introspection ==========

    /// Allow downcasting to concrete types
    fn as_any(&self) -> &dyn Any;

    // ========== Conditional Writes ==========

    /// Store `value` under a key that must not exist yet
    ///
    /// Returns the new etag. Fails with `AlreadyExists` if the key is present.
    async fn create(&self, key: &str, value: Bytes) -> Result<String>;

    /// Same as [`StateStore::create`], but the key expires after `ttl`
    async fn create_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<String>;

    /// Replace the value if the stored etag equals `etag`
    ///
    /// Returns the new etag. Fails with `VersionMismatch` on a stale etag and
    /// `KeyNotFound` if the key is absent.
    async fn update(&self, key: &str, value: Bytes, etag: &str) -> Result<String>;

    // ========== Reads ==========

    /// Read a key. Absent keys yield an empty value and empty etag.
    async fn get(&self, key: &str) -> Result<StateItem>;

    /// All items whose key starts with `prefix`, sorted by key
    async fn list(&self, prefix: &str) -> Result<Vec<StateItem>>;

    // ========== Deletes ==========

    /// Remove a key. Fails with `KeyNotFound` if absent.
    async fn delete(&self, key: &str) -> Result<()>;
}
