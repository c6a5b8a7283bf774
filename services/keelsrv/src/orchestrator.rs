//! Registration orchestrator
//!
//! Registration and deregistration each run as one saga under one deadline.
//! Any error or expiry of the deadline runs the recorded compensations newest
//! first, leaving the registry and route table as they were.

use crate::error::model_err;
use crate::plugin_client::{ensure_ok, PluginClient};
use crate::registry::{MembershipIndex, PluginRegistry};
use crate::route_table::RouteTable;
use crate::saga::Saga;
use crate::tenant::TenantIndex;
use crate::token::generate_secret;
use errors::{invalid_argument, KeelError, KeelResult};
use keel_model::version::is_compatible;
use keel_model::{
    addons, plugin, AddonsIdentifyRequest, BriefPluginInfo, IdentifyResponse, ImplementedPlugin,
    Plugin, PluginRoute,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result of a completed registration or deregistration
#[derive(Debug, Clone, Serialize)]
pub struct PluginEntry {
    pub plugin: Plugin,
    pub route: PluginRoute,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub platform_version: String,
    /// Deadline of one whole attempt
    pub timeout: Duration,
}

/// Addon values to put back on a route: `point -> previous value`, where
/// `None` means the point was unset
type AddonBackup = Vec<(String, Option<String>)>;

pub struct Orchestrator {
    registry: Arc<dyn PluginRegistry>,
    routes: Arc<dyn RouteTable>,
    membership: Arc<MembershipIndex>,
    tenants: Arc<TenantIndex>,
    client: Arc<dyn PluginClient>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<dyn PluginRegistry>,
        routes: Arc<dyn RouteTable>,
        membership: Arc<MembershipIndex>,
        tenants: Arc<TenantIndex>,
        client: Arc<dyn PluginClient>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            routes,
            membership,
            tenants,
            client,
            settings,
        }
    }

    pub fn platform_version(&self) -> &str {
        &self.settings.platform_version
    }

    /// Register `plugin_id`
    ///
    /// When `secret` is `None` a random one is generated.
    pub async fn register(&self, plugin_id: &str, secret: Option<String>) -> KeelResult<PluginEntry> {
        plugin::validate_id(plugin_id).map_err(model_err)?;
        let secret = secret.filter(|s| !s.is_empty()).unwrap_or_else(generate_secret);

        let mut saga = Saga::new(format!("register {}", plugin_id));
        let attempt = tokio::time::timeout(
            self.settings.timeout,
            self.register_steps(plugin_id, secret, &mut saga),
        )
        .await;

        match attempt {
            Ok(Ok(entry)) => {
                saga.commit();
                info!(
                    "Plugin {} registered ({}, requires {})",
                    plugin_id, entry.route.status, entry.plugin.tkeel_version
                );
                Ok(entry)
            },
            Ok(Err(e)) => {
                warn!("Register {} failed: {}", plugin_id, e);
                saga.rollback().await;
                Err(e)
            },
            Err(_) => {
                warn!(
                    "Register {} exceeded {:?}",
                    plugin_id, self.settings.timeout
                );
                saga.rollback().await;
                Err(KeelError::Timeout(format!("register {}", plugin_id)))
            },
        }
    }

    async fn register_steps(
        &self,
        plugin_id: &str,
        secret: String,
        saga: &mut Saga,
    ) -> KeelResult<PluginEntry> {
        // Query identify
        let identify = self.client.identify(plugin_id).await?;
        ensure_ok(plugin_id, "identify", &identify.res)?;
        if identify.plugin_id != plugin_id {
            return Err(invalid_argument!(
                "plugin {} identified itself as {:?}",
                plugin_id, identify.plugin_id
            ));
        }

        // Check identify
        let platform = &self.settings.platform_version;
        if !is_compatible(&identify.tkeel_version, platform).map_err(model_err)? {
            return Err(invalid_argument!(
                "plugin {} requires platform {}, running {}",
                plugin_id, identify.tkeel_version, platform
            ));
        }

        // Transient route
        let mut starting = PluginRoute::starting(plugin_id, identify.tkeel_version.clone());
        starting.implemented_plugin_ids = identify
            .implemented_plugin
            .iter()
            .map(|ip| ip.plugin.id.clone())
            .collect();
        let routes = self.routes.clone();
        let id = plugin_id.to_string();
        saga.step(
            "create route",
            async {
                self.routes.create(&starting).await.map_err(|e| match e {
                    KeelError::AlreadyExists(_) => KeelError::PluginAlreadyExists(plugin_id.to_string()),
                    other => other,
                })
            },
            move || async move { routes.delete(&id).await.map(|_| ()) },
        )
        .await?;

        // Implemented addons
        for implemented in &identify.implemented_plugin {
            self.register_addons(&identify, implemented, saga).await?;
        }

        // Finalize
        let status = self.client.status(plugin_id).await?;
        ensure_ok(plugin_id, "status", &status.res)?;

        let record = Plugin::from_identify(&identify, secret);
        let registry = self.registry.clone();
        let id = plugin_id.to_string();
        let plugin = saga
            .step(
                "create plugin",
                async {
                    self.registry.create(&record).await.map_err(|e| match e {
                        KeelError::AlreadyExists(_) => {
                            KeelError::PluginAlreadyExists(plugin_id.to_string())
                        },
                        other => other,
                    })
                },
                move || async move { registry.delete(&id).await.map(|_| ()) },
            )
            .await?;

        let membership = self.membership.clone();
        let id = plugin_id.to_string();
        saga.step(
            "add membership",
            self.membership.add(plugin_id, status.status),
            move || async move { membership.remove(&id).await },
        )
        .await?;

        let mut route = self
            .routes
            .get(plugin_id)
            .await?
            .ok_or_else(|| KeelError::Internal(format!("route {} vanished", plugin_id)))?;
        route.status = status.status;
        let route = self.routes.update(&route).await?;

        Ok(PluginEntry { plugin, route })
    }

    /// Point `implemented.addons` of the extended plugin at the candidate
    async fn register_addons(
        &self,
        candidate: &IdentifyResponse,
        implemented: &ImplementedPlugin,
        saga: &mut Saga,
    ) -> KeelResult<()> {
        let target_id = &implemented.plugin.id;
        let mut target = self.routes.get(target_id).await?.ok_or_else(|| {
            invalid_argument!("dependency plugin {} not registered", target_id)
        })?;

        if !is_compatible(&target.tkeel_version, &candidate.tkeel_version).map_err(model_err)? {
            return Err(KeelError::VersionIncompatible {
                dependency: format!("{}@{}", target_id, target.tkeel_version),
                caller: format!("{}@{}", candidate.plugin_id, candidate.tkeel_version),
            });
        }

        let req = AddonsIdentifyRequest {
            plugin: BriefPluginInfo {
                id: candidate.plugin_id.clone(),
                version: candidate.version.clone(),
            },
            implemented_addons: implemented.addons.clone(),
        };
        let res = self.client.addons_identify(target_id, &req).await?;
        ensure_ok(target_id, "addons identify", &res)?;

        let backup: AddonBackup = implemented
            .addons
            .iter()
            .map(|a| {
                (
                    a.addons_point.clone(),
                    target.registered_addons.get(&a.addons_point).cloned(),
                )
            })
            .collect();
        target.register_addons(&candidate.plugin_id, &implemented.addons);

        let routes = self.routes.clone();
        let id = target_id.clone();
        saga.step(
            &format!("register addons on {}", target_id),
            self.routes.update(&target),
            move || restore_addons(routes, id, backup),
        )
        .await?;
        Ok(())
    }

    /// Deregister `plugin_id`
    pub async fn deregister(&self, plugin_id: &str) -> KeelResult<PluginEntry> {
        let mut saga = Saga::new(format!("deregister {}", plugin_id));
        let attempt = tokio::time::timeout(
            self.settings.timeout,
            self.deregister_steps(plugin_id, &mut saga),
        )
        .await;

        let entry = match attempt {
            Ok(Ok(entry)) => {
                saga.commit();
                entry
            },
            Ok(Err(e)) => {
                warn!("Deregister {} failed: {}", plugin_id, e);
                saga.rollback().await;
                return Err(e);
            },
            Err(_) => {
                saga.rollback().await;
                return Err(KeelError::Timeout(format!("deregister {}", plugin_id)));
            },
        };

        for tenant in &entry.route.active_tenants {
            if let Err(e) = self.tenants.remove(tenant, plugin_id).await {
                warn!("Deregister {}: tenant index {} not cleaned: {}", plugin_id, tenant, e);
            }
        }
        info!("Plugin {} deregistered", plugin_id);
        Ok(entry)
    }

    async fn deregister_steps(&self, plugin_id: &str, saga: &mut Saga) -> KeelResult<PluginEntry> {
        let route = self
            .routes
            .get(plugin_id)
            .await?
            .ok_or_else(|| KeelError::PluginNotFound(plugin_id.to_string()))?;
        if route.is_depended_on() {
            return Err(KeelError::DeletePluginHasBeenDepended(plugin_id.to_string()));
        }
        let plugin = self
            .registry
            .get(plugin_id)
            .await?
            .ok_or_else(|| KeelError::PluginNotFound(plugin_id.to_string()))?;

        let routes = self.routes.clone();
        let recreate = route.clone();
        saga.step(
            "delete route",
            self.routes.delete(plugin_id),
            move || async move { routes.create(&recreate).await.map(|_| ()) },
        )
        .await?;

        for target_id in plugin.implemented_plugin_ids() {
            self.strip_addons(plugin_id, &target_id, saga).await?;
        }

        let registry = self.registry.clone();
        let recreate = plugin.clone();
        saga.step(
            "delete plugin",
            self.registry.delete(plugin_id),
            move || async move { registry.create(&recreate).await.map(|_| ()) },
        )
        .await?;

        let membership = self.membership.clone();
        let id = plugin_id.to_string();
        let status = route.status;
        saga.step(
            "remove membership",
            self.membership.remove(plugin_id),
            move || async move { membership.add(&id, status).await },
        )
        .await?;

        Ok(PluginEntry { plugin, route })
    }

    /// Remove every addon of `target_id` that resolves to `plugin_id`
    async fn strip_addons(&self, plugin_id: &str, target_id: &str, saga: &mut Saga) -> KeelResult<()> {
        let Some(mut target) = self.routes.get(target_id).await? else {
            warn!("Deregister {}: extended plugin {} has no route", plugin_id, target_id);
            return Ok(());
        };

        let backup: AddonBackup = target
            .registered_addons
            .iter()
            .filter(|(_, value)| addons::decode(value).map(|(p, _)| p) == Some(plugin_id))
            .map(|(point, value)| (point.clone(), Some(value.clone())))
            .collect();
        if backup.is_empty() {
            return Ok(());
        }
        target.remove_addons_of(plugin_id);

        let routes = self.routes.clone();
        let id = target_id.to_string();
        saga.step(
            &format!("strip addons from {}", target_id),
            self.routes.update(&target),
            move || restore_addons(routes, id, backup),
        )
        .await?;
        Ok(())
    }
}

/// Put the backed-up addon entries back onto the current version of a route
async fn restore_addons(
    routes: Arc<dyn RouteTable>,
    target_id: String,
    backup: AddonBackup,
) -> KeelResult<()> {
    let mut route = routes
        .get(&target_id)
        .await?
        .ok_or_else(|| KeelError::PluginNotFound(target_id.clone()))?;
    for (point, previous) in backup {
        match previous {
            Some(value) => {
                route.registered_addons.insert(point, value);
            },
            None => {
                route.registered_addons.remove(&point);
            },
        }
    }
    routes.update(&route).await?;
    Ok(())
}
