//! Tenant binding
//!
//! A tenant is bound to a plugin after the plugin accepts the tenant-bind
//! callback. The route's `active_tenants` is authoritative; the registry
//! record mirrors it and `tenant_bind_<tenant>` lists the plugins a tenant
//! is bound to.

use crate::error::store_err;
use crate::plugin_client::{ensure_ok, PluginClient};
use crate::registry::{contention_backoff, PluginRegistry, INDEX_RETRIES};
use crate::route_table::RouteTable;
use crate::saga::Saga;
use errors::{KeelError, KeelResult};
use keel_model::{KeySpace, PluginRoute, TenantBindRequest};
use keel_state::{encode, StateError, StateStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `tenant_bind_<tenant>`: plugin ids bound to one tenant
pub struct TenantIndex {
    store: Arc<dyn StateStore>,
    keys: KeySpace,
}

impl TenantIndex {
    pub fn new(store: Arc<dyn StateStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    pub async fn plugins(&self, tenant_id: &str) -> KeelResult<Vec<String>> {
        let item = self
            .store
            .get(&self.keys.tenant_bind(tenant_id))
            .await
            .map_err(store_err)?;
        let plugins: Option<Vec<String>> = item.decode().map_err(store_err)?;
        Ok(plugins.unwrap_or_default())
    }

    pub async fn add(&self, tenant_id: &str, plugin_id: &str) -> KeelResult<()> {
        self.modify(tenant_id, |plugins| {
            if !plugins.iter().any(|p| p == plugin_id) {
                plugins.push(plugin_id.to_string());
            }
        })
        .await
    }

    pub async fn remove(&self, tenant_id: &str, plugin_id: &str) -> KeelResult<()> {
        self.modify(tenant_id, |plugins| plugins.retain(|p| p != plugin_id))
            .await
    }

    async fn modify<F>(&self, tenant_id: &str, mut apply: F) -> KeelResult<()>
    where
        F: FnMut(&mut Vec<String>) + Send,
    {
        let key = self.keys.tenant_bind(tenant_id);
        for attempt in 0..INDEX_RETRIES {
            let item = self.store.get(&key).await.map_err(store_err)?;
            let mut plugins: Vec<String> = item.decode().map_err(store_err)?.unwrap_or_default();
            apply(&mut plugins);
            let value = encode(&plugins).map_err(store_err)?;

            let written = if item.is_absent() {
                self.store.create(&key, value).await.map(|_| ())
            } else {
                self.store.update(&key, value, &item.etag).await.map(|_| ())
            };
            match written {
                Ok(()) => return Ok(()),
                Err(StateError::VersionMismatch(_))
                | Err(StateError::AlreadyExists(_))
                | Err(StateError::KeyNotFound(_)) => {
                    debug!("Tenant index {} contended, retry {}", tenant_id, attempt + 1);
                    tokio::time::sleep(contention_backoff(attempt)).await;
                },
                Err(e) => return Err(store_err(e)),
            }
        }
        Err(KeelError::VersionMismatch { key })
    }
}

pub struct TenantManager {
    routes: Arc<dyn RouteTable>,
    registry: Arc<dyn PluginRegistry>,
    index: Arc<TenantIndex>,
    client: Arc<dyn PluginClient>,
}

impl TenantManager {
    pub fn new(
        routes: Arc<dyn RouteTable>,
        registry: Arc<dyn PluginRegistry>,
        index: Arc<TenantIndex>,
        client: Arc<dyn PluginClient>,
    ) -> Self {
        Self {
            routes,
            registry,
            index,
            client,
        }
    }

    async fn route(&self, plugin_id: &str) -> KeelResult<PluginRoute> {
        self.routes
            .get(plugin_id)
            .await?
            .ok_or_else(|| KeelError::PluginNotFound(plugin_id.to_string()))
    }

    /// Bind `tenant_id` to `plugin_id`
    pub async fn bind(
        &self,
        plugin_id: &str,
        tenant_id: &str,
        extra: Option<serde_json::Value>,
    ) -> KeelResult<PluginRoute> {
        if tenant_id.is_empty() {
            return Err(KeelError::InvalidArgument("tenant id is empty".to_string()));
        }
        let mut route = self.route(plugin_id).await?;
        if route.has_tenant(tenant_id) {
            return Err(KeelError::DuplicateActiveTenant {
                plugin: plugin_id.to_string(),
                tenant: tenant_id.to_string(),
            });
        }

        let req = TenantBindRequest {
            tenant_id: tenant_id.to_string(),
            extra,
        };
        let res = self.client.tenant_bind(plugin_id, &req).await?;
        ensure_ok(plugin_id, "tenant bind", &res)?;

        let mut saga = Saga::new(format!("bind {} to {}", tenant_id, plugin_id));
        match self.bind_steps(&mut route, plugin_id, tenant_id, &mut saga).await {
            Ok(updated) => {
                saga.commit();
                info!("Tenant {} bound to {}", tenant_id, plugin_id);
                Ok(updated)
            },
            Err(e) => {
                saga.rollback().await;
                Err(e)
            },
        }
    }

    async fn bind_steps(
        &self,
        route: &mut PluginRoute,
        plugin_id: &str,
        tenant_id: &str,
        saga: &mut Saga,
    ) -> KeelResult<PluginRoute> {
        route.active_tenants.push(tenant_id.to_string());
        let routes = self.routes.clone();
        let (pid, tid) = (plugin_id.to_string(), tenant_id.to_string());
        let updated = saga
            .step(
                "add tenant to route",
                self.routes.update(route),
                move || async move { drop_tenant_from_route(routes, &pid, &tid).await },
            )
            .await?;

        let index = self.index.clone();
        let (pid, tid) = (plugin_id.to_string(), tenant_id.to_string());
        saga.step(
            "add tenant index",
            self.index.add(tenant_id, plugin_id),
            move || async move { index.remove(&tid, &pid).await },
        )
        .await?;

        self.mirror_tenants(plugin_id, &updated.active_tenants).await;
        Ok(updated)
    }

    /// Unbind; a tenant that is not bound is left alone
    pub async fn unbind(&self, plugin_id: &str, tenant_id: &str) -> KeelResult<PluginRoute> {
        let route = self.route(plugin_id).await?;
        if !route.has_tenant(tenant_id) {
            debug!("Tenant {} not bound to {}", tenant_id, plugin_id);
            return Ok(route);
        }
        let mut updated = route;
        updated.active_tenants.retain(|t| t != tenant_id);
        let updated = self.routes.update(&updated).await?;
        self.index.remove(tenant_id, plugin_id).await?;
        self.mirror_tenants(plugin_id, &updated.active_tenants).await;
        info!("Tenant {} unbound from {}", tenant_id, plugin_id);
        Ok(updated)
    }

    pub async fn list(&self, plugin_id: &str) -> KeelResult<Vec<String>> {
        Ok(self.route(plugin_id).await?.active_tenants)
    }

    /// Copy the route's tenant list onto the registry record
    async fn mirror_tenants(&self, plugin_id: &str, tenants: &[String]) {
        let result = async {
            if let Some(mut plugin) = self.registry.get(plugin_id).await? {
                plugin.active_tenants = tenants.to_vec();
                self.registry.update(&plugin).await?;
            }
            Ok::<_, KeelError>(())
        }
        .await;
        if let Err(e) = result {
            warn!("Tenant mirror on plugin {} failed: {}", plugin_id, e);
        }
    }
}

async fn drop_tenant_from_route(
    routes: Arc<dyn RouteTable>,
    plugin_id: &str,
    tenant_id: &str,
) -> KeelResult<()> {
    let Some(mut route) = routes.get(plugin_id).await? else {
        return Ok(());
    };
    route.active_tenants.retain(|t| t != tenant_id);
    routes.update(&route).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use keel_state::helpers::create_test_store;

    #[tokio::test]
    async fn test_tenant_index_add_remove() {
        let index = TenantIndex::new(create_test_store(), KeySpace::test());
        index.add("t1", "core").await.unwrap();
        index.add("t1", "core").await.unwrap();
        index.add("t1", "ext").await.unwrap();
        assert_eq!(index.plugins("t1").await.unwrap(), vec!["core", "ext"]);

        index.remove("t1", "core").await.unwrap();
        assert_eq!(index.plugins("t1").await.unwrap(), vec!["ext"]);
        assert!(index.plugins("t2").await.unwrap().is_empty());
    }
}
