//! Plugin registry and the membership index
//!
//! Registry records live under `plugin_<id>`. The membership index is one
//! JSON map `id -> status` under `all_registered_plugin`, read by the
//! reconciler to know which plugins to scrape.

use crate::error::store_err;
use async_trait::async_trait;
use errors::{KeelError, KeelResult};
use keel_model::plugin::INITIAL_VERSION;
use keel_model::{KeySpace, Plugin, PluginStatus};
use keel_state::{encode, StateError, StateItem, StateStore};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// CRUD over registered plugins
#[async_trait]
pub trait PluginRegistry: Send + Sync {
    /// Fails `AlreadyExists` when the id is taken
    async fn create(&self, plugin: &Plugin) -> KeelResult<Plugin>;

    /// `plugin.version` is the expected token; returns the record with the new one
    async fn update(&self, plugin: &Plugin) -> KeelResult<Plugin>;

    async fn get(&self, id: &str) -> KeelResult<Option<Plugin>>;

    /// Fails `NotFound` when absent, returns the deleted record otherwise
    async fn delete(&self, id: &str) -> KeelResult<Plugin>;

    async fn list(&self) -> KeelResult<Vec<Plugin>>;
}

pub struct StatePluginRegistry {
    store: Arc<dyn StateStore>,
    keys: KeySpace,
}

impl StatePluginRegistry {
    pub fn new(store: Arc<dyn StateStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }
}

fn decode_plugin(item: &StateItem) -> KeelResult<Option<Plugin>> {
    let plugin: Option<Plugin> = item.decode().map_err(store_err)?;
    Ok(plugin.map(|mut p| {
        p.version = item.etag.clone();
        p
    }))
}

#[async_trait]
impl PluginRegistry for StatePluginRegistry {
    async fn create(&self, plugin: &Plugin) -> KeelResult<Plugin> {
        let key = self.keys.plugin(&plugin.id);
        let mut record = plugin.clone();
        record.version = INITIAL_VERSION.to_string();
        let etag = self
            .store
            .create(&key, encode(&record).map_err(store_err)?)
            .await
            .map_err(store_err)?;
        record.version = etag;
        debug!("Registry: created {}", plugin.id);
        Ok(record)
    }

    async fn update(&self, plugin: &Plugin) -> KeelResult<Plugin> {
        let key = self.keys.plugin(&plugin.id);
        let mut record = plugin.clone();
        let etag = self
            .store
            .update(&key, encode(&record).map_err(store_err)?, &plugin.version)
            .await
            .map_err(store_err)?;
        record.version = etag;
        Ok(record)
    }

    async fn get(&self, id: &str) -> KeelResult<Option<Plugin>> {
        let item = self.store.get(&self.keys.plugin(id)).await.map_err(store_err)?;
        decode_plugin(&item)
    }

    async fn delete(&self, id: &str) -> KeelResult<Plugin> {
        let key = self.keys.plugin(id);
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| KeelError::PluginNotFound(id.to_string()))?;
        self.store.delete(&key).await.map_err(|e| match e {
            StateError::KeyNotFound(_) => KeelError::PluginNotFound(id.to_string()),
            other => store_err(other),
        })?;
        debug!("Registry: deleted {}", id);
        Ok(existing)
    }

    async fn list(&self) -> KeelResult<Vec<Plugin>> {
        let items = self
            .store
            .list(&self.keys.plugin_prefix())
            .await
            .map_err(store_err)?;

        let mut plugins = Vec::new();
        for item in items.iter().filter(|i| self.keys.plugin_id(&i.key).is_some()) {
            match decode_plugin(item) {
                Ok(Some(plugin)) => plugins.push(plugin),
                Ok(None) => {},
                Err(e) => warn!("Registry: skipping {}: {}", item.key, e),
            }
        }
        Ok(plugins)
    }
}

/// Attempts before a contended index write gives up
pub(crate) const INDEX_RETRIES: u32 = 32;
const BACKOFF_CAP: Duration = Duration::from_millis(32);

/// Pause before retry `attempt` of a contended index write
///
/// Exponential from 1ms up to `BACKOFF_CAP`, plus up to the same again at
/// random so colliding writers spread out.
pub(crate) fn contention_backoff(attempt: u32) -> Duration {
    let base = Duration::from_millis(1u64 << attempt.min(5)).min(BACKOFF_CAP);
    let jitter = rand::thread_rng().gen_range(0..=base.as_micros() as u64);
    base + Duration::from_micros(jitter)
}

/// `all_registered_plugin`: ids of fully registered plugins with their last
/// known status
pub struct MembershipIndex {
    store: Arc<dyn StateStore>,
    keys: KeySpace,
}

pub type Membership = BTreeMap<String, PluginStatus>;

impl MembershipIndex {
    pub fn new(store: Arc<dyn StateStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Current index and its token (`""` when the index does not exist yet)
    pub async fn load(&self) -> KeelResult<(Membership, String)> {
        let item = self
            .store
            .get(&self.keys.all_registered_plugin())
            .await
            .map_err(store_err)?;
        let members: Option<Membership> = item.decode().map_err(store_err)?;
        Ok((members.unwrap_or_default(), item.etag))
    }

    pub async fn list(&self) -> KeelResult<Membership> {
        Ok(self.load().await?.0)
    }

    pub async fn add(&self, id: &str, status: PluginStatus) -> KeelResult<()> {
        self.modify(|m| {
            m.insert(id.to_string(), status);
        })
        .await
    }

    pub async fn remove(&self, id: &str) -> KeelResult<()> {
        self.modify(|m| {
            m.remove(id);
        })
        .await
    }

    /// Record a status for members still present; unknown ids are ignored
    pub async fn set_status(&self, id: &str, status: PluginStatus) -> KeelResult<()> {
        self.modify(|m| {
            if let Some(s) = m.get_mut(id) {
                *s = status;
            }
        })
        .await
    }

    /// Read-modify-write with CAS, re-reading on contention
    async fn modify<F>(&self, mut apply: F) -> KeelResult<()>
    where
        F: FnMut(&mut Membership) + Send,
    {
        let key = self.keys.all_registered_plugin();
        for attempt in 0..INDEX_RETRIES {
            let (mut members, etag) = self.load().await?;
            apply(&mut members);
            let value = encode(&members).map_err(store_err)?;

            let written = if etag.is_empty() {
                self.store.create(&key, value).await.map(|_| ())
            } else {
                self.store.update(&key, value, &etag).await.map(|_| ())
            };
            match written {
                Ok(()) => return Ok(()),
                Err(StateError::VersionMismatch(_))
                | Err(StateError::AlreadyExists(_))
                | Err(StateError::KeyNotFound(_)) => {
                    debug!("Membership index contended, retry {}", attempt + 1);
                    tokio::time::sleep(contention_backoff(attempt)).await;
                },
                Err(e) => return Err(store_err(e)),
            }
        }
        Err(KeelError::VersionMismatch { key })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use keel_state::helpers::create_test_store;

    fn registry() -> StatePluginRegistry {
        StatePluginRegistry::new(create_test_store(), KeySpace::test())
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let registry = registry();
        let created = registry.create(&Plugin::new("core")).await.unwrap();
        assert_eq!(created.version, "1");
        assert!(matches!(
            registry.create(&Plugin::new("core")).await,
            Err(KeelError::AlreadyExists(_))
        ));

        let mut fetched = registry.get("core").await.unwrap().unwrap();
        fetched.secret = "s".into();
        let updated = registry.update(&fetched).await.unwrap();
        assert_eq!(updated.version, "2");

        // Stale token
        assert!(matches!(
            registry.update(&fetched).await,
            Err(KeelError::VersionMismatch { .. })
        ));

        let deleted = registry.delete("core").await.unwrap();
        assert_eq!(deleted.secret, "s");
        assert!(registry.get("core").await.unwrap().is_none());
        assert!(matches!(
            registry.delete("core").await,
            Err(KeelError::PluginNotFound(_))
        ));
    }

    #[test]
    fn test_contention_backoff_bounds() {
        for attempt in 0..INDEX_RETRIES {
            let pause = contention_backoff(attempt);
            assert!(pause >= Duration::from_millis(1));
            assert!(pause <= BACKOFF_CAP * 2);
        }
        assert!(contention_backoff(10) >= BACKOFF_CAP);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_membership_survives_heavy_contention() {
        let index = Arc::new(MembershipIndex::new(create_test_store(), KeySpace::test()));
        let mut handles = Vec::new();
        for i in 0..48 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                index.add(&format!("p{}", i), PluginStatus::Running).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(index.list().await.unwrap().len(), 48);
    }

    #[tokio::test]
    async fn test_list_ignores_routes() {
        let store = create_test_store();
        let keys = KeySpace::test();
        let registry = StatePluginRegistry::new(store.clone(), keys.clone());
        registry.create(&Plugin::new("a")).await.unwrap();
        registry.create(&Plugin::new("b")).await.unwrap();
        store
            .create(&keys.route("a"), encode(&"route").unwrap())
            .await
            .unwrap();

        let ids: Vec<_> = registry.list().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_membership_index() {
        let index = MembershipIndex::new(create_test_store(), KeySpace::test());
        assert!(index.list().await.unwrap().is_empty());

        index.add("a", PluginStatus::Starting).await.unwrap();
        index.add("b", PluginStatus::Running).await.unwrap();
        index.set_status("a", PluginStatus::Running).await.unwrap();
        index.set_status("ghost", PluginStatus::Failed).await.unwrap();
        index.remove("b").await.unwrap();

        let members = index.list().await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members["a"], PluginStatus::Running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_membership_concurrent_adds() {
        let index = Arc::new(MembershipIndex::new(create_test_store(), KeySpace::test()));
        let mut handles = vec![];
        for i in 0..6 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                index.add(&format!("p{}", i), PluginStatus::Running).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(index.list().await.unwrap().len(), 6);
    }
}
