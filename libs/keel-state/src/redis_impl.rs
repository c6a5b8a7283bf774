//! Redis implementation of the state store
//!
//! Each key is a hash with a `data` field and a `version` field. Conditional
//! writes run as Lua scripts so the check and the write are one atomic step.
//! Versions are drawn from one `INCR` sequence key, so etags never repeat
//! when a key is deleted and created again.

use crate::error::{Result, StateError};
use crate::traits::*;
use async_trait::async_trait;
use bytes::Bytes;
use common::redis::RedisClient;
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

const DATA_FIELD: &str = "data";
const VERSION_FIELD: &str = "version";
/// Counter every etag is drawn from
pub const ETAG_SEQUENCE_KEY: &str = "keel:etag_sequence";

// KEYS[1] key, KEYS[2] sequence, ARGV[1] data, ARGV[2] ttl millis (0 = no expiry)
// Returns 0 when the key exists, the new version otherwise
static CREATE_SCRIPT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        if redis.call('EXISTS', KEYS[1]) == 1 then
            return 0
        end
        local version = redis.call('INCR', KEYS[2])
        redis.call('HSET', KEYS[1], 'data', ARGV[1], 'version', tostring(version))
        local ttl = tonumber(ARGV[2])
        if ttl and ttl > 0 then
            redis.call('PEXPIRE', KEYS[1], ttl)
        end
        return version
        ",
    )
});

// KEYS[1] key, KEYS[2] sequence, ARGV[1] data, ARGV[2] expected version
// Returns -1 when absent, 0 on mismatch, the new version otherwise
static UPDATE_SCRIPT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local current = redis.call('HGET', KEYS[1], 'version')
        if not current then
            return -1
        end
        if current ~= ARGV[2] then
            return 0
        end
        local version = redis.call('INCR', KEYS[2])
        redis.call('HSET', KEYS[1], 'data', ARGV[1], 'version', tostring(version))
        return version
        ",
    )
});

/// Redis-backed state store
pub struct RedisStateStore {
    client: Arc<RedisClient>,
}

impl RedisStateStore {
    /// Create new Redis state store from URL
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: Arc::new(RedisClient::new(url).await?),
        })
    }

    /// Create from existing RedisClient
    pub fn from_client(client: Arc<RedisClient>) -> Self {
        Self { client }
    }

    /// Get reference to underlying Redis client
    pub fn client(&self) -> &Arc<RedisClient> {
        &self.client
    }

    async fn create_inner(&self, key: &str, value: Bytes, ttl_ms: u128) -> Result<String> {
        let data = utf8(key, &value)?;
        let ttl = ttl_ms.to_string();
        let created: i64 = self
            .client
            .eval_script(&CREATE_SCRIPT, &[key, ETAG_SEQUENCE_KEY], &[data, &ttl])
            .await
            .map_err(connection_error)?;

        if created > 0 {
            Ok(created.to_string())
        } else {
            Err(StateError::AlreadyExists(key.to_string()))
        }
    }

    async fn read(&self, key: &str) -> Result<StateItem> {
        let fields: Vec<Option<Vec<u8>>> = self
            .client
            .hmget(key, &[DATA_FIELD, VERSION_FIELD])
            .await
            .map_err(connection_error)?;

        match (fields.first().cloned().flatten(), fields.get(1).cloned().flatten()) {
            (Some(data), Some(version)) => Ok(StateItem {
                key: key.to_string(),
                value: Bytes::from(data),
                etag: String::from_utf8(version)
                    .map_err(|e| StateError::SerializationError(e.to_string()))?,
            }),
            _ => Ok(StateItem::absent(key)),
        }
    }
}

fn utf8<'a>(key: &str, value: &'a Bytes) -> Result<&'a str> {
    std::str::from_utf8(value)
        .map_err(|e| StateError::SerializationError(format!("{}: {}", key, e)))
}

fn connection_error(err: anyhow::Error) -> StateError {
    StateError::ConnectionError(format!("{:#}", err))
}

#[async_trait]
impl StateStore for RedisStateStore {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn create(&self, key: &str, value: Bytes) -> Result<String> {
        self.create_inner(key, value, 0).await
    }

    async fn create_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<String> {
        // Zero would mean "no expiry" to the script
        self.create_inner(key, value, ttl.as_millis().max(1)).await
    }

    async fn update(&self, key: &str, value: Bytes, etag: &str) -> Result<String> {
        let data = utf8(key, &value)?;
        let result: i64 = self
            .client
            .eval_script(&UPDATE_SCRIPT, &[key, ETAG_SEQUENCE_KEY], &[data, etag])
            .await
            .map_err(connection_error)?;

        match result {
            -1 => Err(StateError::KeyNotFound(key.to_string())),
            0 => Err(StateError::VersionMismatch(key.to_string())),
            version => Ok(version.to_string()),
        }
    }

    async fn get(&self, key: &str) -> Result<StateItem> {
        self.read(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StateItem>> {
        let mut keys = self
            .client
            .scan_match(&format!("{}*", prefix))
            .await
            .map_err(connection_error)?;
        keys.sort();

        let mut items = Vec::with_capacity(keys.len());
        for key in keys.into_iter().filter(|k| k != ETAG_SEQUENCE_KEY) {
            let item = self.read(&key).await?;
            // Deleted between SCAN and HMGET
            if !item.is_absent() {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let removed = self.client.del(&[key]).await.map_err(connection_error)?;
        if removed == 0 {
            return Err(StateError::KeyNotFound(key.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    async fn store() -> RedisStateStore {
        let store = RedisStateStore::new("redis://localhost:6379").await.unwrap();
        for key in ["keel_test:a", "keel_test:lock"] {
            let _ = store.delete(key).await;
        }
        store
    }

    #[tokio::test]
    #[ignore] // Requires Redis server
    async fn test_redis_store_cas_cycle() {
        let store = store().await;

        let first = store.create("keel_test:a", Bytes::from("1")).await.unwrap();
        assert!(matches!(
            store.create("keel_test:a", Bytes::from("1")).await,
            Err(StateError::AlreadyExists(_))
        ));
        let second = store
            .update("keel_test:a", Bytes::from("2"), &first)
            .await
            .unwrap();
        assert_ne!(first, second);
        assert!(matches!(
            store.update("keel_test:a", Bytes::from("3"), &first).await,
            Err(StateError::VersionMismatch(_))
        ));

        let items = store.list("keel_test:").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].value, Bytes::from("2"));
        assert_eq!(items[0].etag, second);

        store.delete("keel_test:a").await.unwrap();
        assert!(store.get("keel_test:a").await.unwrap().is_absent());

        // Recreated key does not take back an old etag
        let third = store.create("keel_test:a", Bytes::from("4")).await.unwrap();
        assert_ne!(third, first);
        assert_ne!(third, second);
        assert!(matches!(
            store.update("keel_test:a", Bytes::from("5"), &first).await,
            Err(StateError::VersionMismatch(_))
        ));
        store.delete("keel_test:a").await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis server
    async fn test_redis_store_ttl() {
        let store = store().await;
        store
            .create_with_ttl("keel_test:lock", Bytes::from("1"), Duration::from_millis(200))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(store.get("keel_test:lock").await.unwrap().is_absent());
    }
}
