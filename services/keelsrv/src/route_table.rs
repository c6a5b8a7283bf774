//! Route table
//!
//! Routes live under `plugin_route_<id>`. The store etag is the route's CAS
//! token: reads copy it into `PluginRoute::version` and updates send it back.

use crate::error::store_err;
use async_trait::async_trait;
use errors::{KeelError, KeelResult};
use keel_model::plugin::INITIAL_VERSION;
use keel_model::{KeySpace, PluginRoute};
use keel_state::{encode, watch_prefix, StateError, StateItem, StateStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type RouteSnapshot = HashMap<String, PluginRoute>;
pub type RouteCallback = Box<dyn FnMut(RouteSnapshot) + Send + 'static>;

#[async_trait]
pub trait RouteTable: Send + Sync {
    /// Fails `AlreadyExists` when a route with this id exists
    async fn create(&self, route: &PluginRoute) -> KeelResult<PluginRoute>;

    /// `route.version` is the expected token; a mismatch fails `VersionMismatch`
    async fn update(&self, route: &PluginRoute) -> KeelResult<PluginRoute>;

    async fn get(&self, id: &str) -> KeelResult<Option<PluginRoute>>;

    /// Fails `NotFound` when absent
    async fn delete(&self, id: &str) -> KeelResult<PluginRoute>;

    async fn list(&self) -> KeelResult<Vec<PluginRoute>>;

    /// Deliver the full id -> route map whenever any route changes
    fn watch(
        &self,
        interval: Duration,
        cancel: CancellationToken,
        callback: RouteCallback,
    ) -> JoinHandle<()>;
}

pub struct StateRouteTable {
    store: Arc<dyn StateStore>,
    keys: KeySpace,
}

impl StateRouteTable {
    pub fn new(store: Arc<dyn StateStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }
}

fn decode_route(item: &StateItem) -> KeelResult<Option<PluginRoute>> {
    let route: Option<PluginRoute> = item.decode().map_err(store_err)?;
    Ok(route.map(|mut r| {
        r.version = item.etag.clone();
        r
    }))
}

/// Build the watch snapshot, dropping records that do not decode
fn snapshot(keys: &KeySpace, items: &[StateItem]) -> RouteSnapshot {
    let mut routes = HashMap::with_capacity(items.len());
    for item in items {
        let Some(id) = keys.route_id(&item.key) else {
            continue;
        };
        match decode_route(item) {
            Ok(Some(route)) => {
                routes.insert(id.to_string(), route);
            },
            Ok(None) => {},
            Err(e) => warn!("Route watch: skipping {}: {}", item.key, e),
        }
    }
    routes
}

#[async_trait]
impl RouteTable for StateRouteTable {
    async fn create(&self, route: &PluginRoute) -> KeelResult<PluginRoute> {
        let mut record = route.clone();
        record.version = INITIAL_VERSION.to_string();
        let etag = self
            .store
            .create(&self.keys.route(&route.id), encode(&record).map_err(store_err)?)
            .await
            .map_err(store_err)?;
        record.version = etag;
        debug!("Route table: created {} ({})", route.id, route.status);
        Ok(record)
    }

    async fn update(&self, route: &PluginRoute) -> KeelResult<PluginRoute> {
        let mut record = route.clone();
        let etag = self
            .store
            .update(
                &self.keys.route(&route.id),
                encode(&record).map_err(store_err)?,
                &route.version,
            )
            .await
            .map_err(store_err)?;
        record.version = etag;
        debug!("Route table: updated {} to version {}", route.id, record.version);
        Ok(record)
    }

    async fn get(&self, id: &str) -> KeelResult<Option<PluginRoute>> {
        let item = self.store.get(&self.keys.route(id)).await.map_err(store_err)?;
        decode_route(&item)
    }

    async fn delete(&self, id: &str) -> KeelResult<PluginRoute> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| KeelError::not_found(self.keys.route(id)))?;
        self.store
            .delete(&self.keys.route(id))
            .await
            .map_err(|e| match e {
                StateError::KeyNotFound(key) => KeelError::not_found(key),
                other => store_err(other),
            })?;
        debug!("Route table: deleted {}", id);
        Ok(existing)
    }

    async fn list(&self) -> KeelResult<Vec<PluginRoute>> {
        let items = self
            .store
            .list(&self.keys.route_prefix())
            .await
            .map_err(store_err)?;
        let mut routes: Vec<_> = snapshot(&self.keys, &items).into_values().collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(routes)
    }

    fn watch(
        &self,
        interval: Duration,
        cancel: CancellationToken,
        mut callback: RouteCallback,
    ) -> JoinHandle<()> {
        let keys = self.keys.clone();
        watch_prefix(
            self.store.clone(),
            self.keys.route_prefix(),
            interval,
            cancel,
            move |items| callback(snapshot(&keys, &items)),
        )
    }
}
