//! In-memory state store implementation
//!
//! Uses DashMap entry locking so every conditional write is atomic per key.
//! Etags come from one store-wide counter, so a key that is deleted and
//! created again never repeats an etag of its earlier life.
//! Expiry uses the tokio clock, which lets tests drive TTLs with paused time.

use crate::error::{Result, StateError};
use crate::traits::*;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    version: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    fn to_item(&self, key: &str) -> StateItem {
        StateItem {
            key: key.to_string(),
            value: self.value.clone(),
            etag: self.version.to_string(),
        }
    }
}

/// In-memory state store with concurrent access support
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    entries: Arc<DashMap<String, Entry>>,
    sequence: Arc<AtomicU64>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get statistics about stored data
    pub fn stats(&self) -> MemoryStats {
        let now = Instant::now();
        let expiring = self
            .entries
            .iter()
            .filter(|e| e.expires_at.is_some() && !e.is_expired(now))
            .count();
        MemoryStats {
            key_count: self.entries.len(),
            expiring_count: expiring,
        }
    }

    fn next_version(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn insert_new(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<String> {
        let now = Instant::now();
        let fresh = |version| Entry {
            value,
            version,
            expires_at: ttl.map(|t| now + t),
        };

        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return Err(StateError::AlreadyExists(key.to_string()));
                }
                let version = self.next_version();
                occupied.insert(fresh(version));
                Ok(version.to_string())
            },
            MapEntry::Vacant(vacant) => {
                let version = self.next_version();
                vacant.insert(fresh(version));
                Ok(version.to_string())
            },
        }
    }
}

/// Statistics about memory store usage
#[derive(Debug, Clone)]
pub struct MemoryStats {
    pub key_count: usize,
    pub expiring_count: usize,
}

#[async_trait]
impl StateStore for MemoryStateStore {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn create(&self, key: &str, value: Bytes) -> Result<String> {
        self.insert_new(key, value, None)
    }

    async fn create_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<String> {
        self.insert_new(key, value, Some(ttl))
    }

    async fn update(&self, key: &str, value: Bytes, etag: &str) -> Result<String> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.remove();
                    return Err(StateError::KeyNotFound(key.to_string()));
                }
                let entry = occupied.get_mut();
                if entry.version.to_string() != etag {
                    return Err(StateError::VersionMismatch(key.to_string()));
                }
                entry.version = self.next_version();
                entry.value = value;
                Ok(entry.version.to_string())
            },
            MapEntry::Vacant(_) => Err(StateError::KeyNotFound(key.to_string())),
        }
    }

    async fn get(&self, key: &str) -> Result<StateItem> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(entry.to_item(key)),
            _ => Ok(StateItem::absent(key)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StateItem>> {
        let now = Instant::now();
        let mut items: Vec<StateItem> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().is_expired(now))
            .map(|e| e.value().to_item(e.key()))
            .collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(items)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let now = Instant::now();
        match self.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired(now) => Ok(()),
            _ => Err(StateError::KeyNotFound(key.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_create_and_get() {
        let store = MemoryStateStore::new();

        let etag = store.create("k", Bytes::from("v1")).await.unwrap();
        assert_eq!(etag, "1");

        let item = store.get("k").await.unwrap();
        assert_eq!(item.value, Bytes::from("v1"));
        assert_eq!(item.etag, "1");

        let err = store.create("k", Bytes::from("v2")).await.unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_memory_store_get_absent() {
        let store = MemoryStateStore::new();
        let item = store.get("missing").await.unwrap();
        assert!(item.is_absent());
        assert!(item.value.is_empty());
        assert!(item.decode::<String>().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_update_cas() {
        let store = MemoryStateStore::new();
        store.create("k", Bytes::from("a")).await.unwrap();

        let etag = store.update("k", Bytes::from("b"), "1").await.unwrap();
        assert_eq!(etag, "2");

        let err = store.update("k", Bytes::from("c"), "1").await.unwrap_err();
        assert!(matches!(err, StateError::VersionMismatch(_)));
        assert_eq!(store.get("k").await.unwrap().value, Bytes::from("b"));

        let err = store
            .update("other", Bytes::from("c"), "1")
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::KeyNotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_store_delete() {
        let store = MemoryStateStore::new();
        store.create("k", Bytes::from("a")).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_absent());

        let err = store.delete("k").await.unwrap_err();
        assert!(matches!(err, StateError::KeyNotFound(_)));

        // A recreated key starts from a fresh etag
        let etag = store.create("k", Bytes::from("b")).await.unwrap();
        assert_ne!(etag, "1");
        let err = store.update("k", Bytes::from("c"), "1").await.unwrap_err();
        assert!(matches!(err, StateError::VersionMismatch(_)));
    }

    #[tokio::test]
    async fn test_memory_store_etags_unique_across_keys() {
        let store = MemoryStateStore::new();
        let a = store.create("a", Bytes::from("1")).await.unwrap();
        let b = store.create("b", Bytes::from("1")).await.unwrap();
        let a2 = store.update("a", Bytes::from("2"), &a).await.unwrap();
        assert_ne!(a, b);
        assert!(a2.parse::<u64>().unwrap() > b.parse::<u64>().unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_list_prefix() {
        let store = MemoryStateStore::new();
        store.create("plugin_route_b", Bytes::from("2")).await.unwrap();
        store.create("plugin_route_a", Bytes::from("1")).await.unwrap();
        store.create("plugin_a", Bytes::from("x")).await.unwrap();

        let items = store.list("plugin_route_").await.unwrap();
        let keys: Vec<_> = items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["plugin_route_a", "plugin_route_b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_ttl_expiry() {
        let store = MemoryStateStore::new();
        store
            .create_with_ttl("lock", Bytes::from("1"), Duration::from_secs(30))
            .await
            .unwrap();

        let err = store
            .create_with_ttl("lock", Bytes::from("1"), Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(_)));
        assert_eq!(store.stats().expiring_count, 1);

        tokio::time::advance(Duration::from_secs(31)).await;

        assert!(store.get("lock").await.unwrap().is_absent());
        store
            .create_with_ttl("lock", Bytes::from("2"), Duration::from_secs(30))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_concurrent_create_single_winner() {
        let store = Arc::new(MemoryStateStore::new());

        let mut handles = vec![];
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create("race", Bytes::from(i.to_string())).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(StateError::AlreadyExists(_)) => {},
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_memory_store_concurrent_update_single_winner() {
        let store = Arc::new(MemoryStateStore::new());
        store.create("cas", Bytes::from("0")).await.unwrap();

        let mut handles = vec![];
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update("cas", Bytes::from(i.to_string()), "1").await
            }));
        }

        let results: Vec<_> = futures_join(handles).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(store.get("cas").await.unwrap().etag, "2");
    }

    async fn futures_join(
        handles: Vec<tokio::task::JoinHandle<Result<String>>>,
    ) -> Vec<Result<String>> {
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.await.unwrap());
        }
        out
    }
}
