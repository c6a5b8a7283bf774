//! Shared test scaffolding
//!
//! `TestEnv` wires a full `AppState` over an in-memory store and a scripted
//! plugin client. `FailingStateStore` injects store failures on chosen keys.

#![allow(clippy::disallowed_methods)] // Integration test - unwrap is acceptable
#![allow(dead_code)]

use async_trait::async_trait;
use errors::{KeelError, KeelResult};
use keel_model::{
    AddonsIdentifyRequest, BriefPluginInfo, CommonResult, IdentifyResponse, ImplementedAddons,
    ImplementedPlugin, Plugin, PluginRoute, PluginStatus, StatusResponse, TenantBindRequest,
};
use keel_state::{Bytes, MemoryStateStore, StateError, StateItem, StateStore};
use keelsrv::app_state::AppState;
use keelsrv::config::KeelsrvConfig;
use keelsrv::plugin_client::PluginClient;
use keelsrv::registry::Membership;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Scripted plugin client
// ============================================================================

#[derive(Default)]
struct MockState {
    identities: HashMap<String, IdentifyResponse>,
    statuses: HashMap<String, PluginStatus>,
    reject_addons: HashSet<String>,
    fail_status: HashSet<String>,
    reject_tenant: HashSet<String>,
    identify_delay: HashMap<String, Duration>,
    status_delay: HashMap<String, Duration>,
    calls: Vec<String>,
}

/// Plugin client answering from scripted identities
#[derive(Default)]
pub struct MockPluginClient {
    state: Mutex<MockState>,
}

impl MockPluginClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plugin with no addons, reporting RUNNING
    pub fn plugin(&self, id: &str, tkeel_version: &str) {
        self.identity(IdentifyResponse {
            res: CommonResult::ok(),
            plugin_id: id.to_string(),
            version: "v0.1.0".to_string(),
            tkeel_version: tkeel_version.to_string(),
            ..Default::default()
        });
    }

    /// A plugin implementing `points` (`(point, endpoint)`) of `target`
    pub fn implementing(&self, id: &str, tkeel_version: &str, target: &str, points: &[(&str, &str)]) {
        self.plugin(id, tkeel_version);
        let mut state = self.state.lock().unwrap();
        let identity = state.identities.get_mut(id).unwrap();
        identity.implemented_plugin.push(ImplementedPlugin {
            plugin: BriefPluginInfo {
                id: target.to_string(),
                version: "v0.1.0".to_string(),
            },
            addons: points
                .iter()
                .map(|(point, endpoint)| ImplementedAddons {
                    addons_point: point.to_string(),
                    implemented_endpoint: endpoint.to_string(),
                })
                .collect(),
        });
    }

    pub fn identity(&self, identity: IdentifyResponse) {
        let id = identity.plugin_id.clone();
        self.identity_for(&id, identity);
    }

    /// Answer identify calls to `id` with `identity`, whatever id it claims
    pub fn identity_for(&self, id: &str, identity: IdentifyResponse) {
        let mut state = self.state.lock().unwrap();
        state
            .statuses
            .entry(id.to_string())
            .or_insert(PluginStatus::Running);
        state.identities.insert(id.to_string(), identity);
    }

    pub fn set_status(&self, id: &str, status: PluginStatus) {
        self.state.lock().unwrap().statuses.insert(id.to_string(), status);
    }

    /// `target` answers addons-identify with an error
    pub fn reject_addons_on(&self, target: &str) {
        self.state.lock().unwrap().reject_addons.insert(target.to_string());
    }

    pub fn fail_status_of(&self, id: &str) {
        self.state.lock().unwrap().fail_status.insert(id.to_string());
    }

    pub fn reject_tenants_on(&self, id: &str) {
        self.state.lock().unwrap().reject_tenant.insert(id.to_string());
    }

    pub fn slow_identify(&self, id: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .identify_delay
            .insert(id.to_string(), delay);
    }

    pub fn slow_status(&self, id: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .status_delay
            .insert(id.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn refused(msg: &str) -> CommonResult {
    CommonResult {
        ret: -1,
        msg: msg.to_string(),
    }
}

#[async_trait]
impl PluginClient for MockPluginClient {
    async fn identify(&self, plugin_id: &str) -> KeelResult<IdentifyResponse> {
        self.record(format!("identify {}", plugin_id));
        let delay = self.state.lock().unwrap().identify_delay.get(plugin_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .lock()
            .unwrap()
            .identities
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| KeelError::PluginCallback {
                plugin: plugin_id.to_string(),
                message: "connection refused".to_string(),
            })
    }

    async fn status(&self, plugin_id: &str) -> KeelResult<StatusResponse> {
        self.record(format!("status {}", plugin_id));
        let delay = self.state.lock().unwrap().status_delay.get(plugin_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        if state.fail_status.contains(plugin_id) {
            return Ok(StatusResponse {
                res: refused("status unavailable"),
                status: PluginStatus::Failed,
            });
        }
        let status = state
            .statuses
            .get(plugin_id)
            .copied()
            .ok_or_else(|| KeelError::PluginCallback {
                plugin: plugin_id.to_string(),
                message: "connection refused".to_string(),
            })?;
        Ok(StatusResponse {
            res: CommonResult::ok(),
            status,
        })
    }

    async fn addons_identify(
        &self,
        plugin_id: &str,
        req: &AddonsIdentifyRequest,
    ) -> KeelResult<CommonResult> {
        self.record(format!("addons_identify {} from {}", plugin_id, req.plugin.id));
        if self.state.lock().unwrap().reject_addons.contains(plugin_id) {
            return Ok(refused("addons rejected"));
        }
        Ok(CommonResult::ok())
    }

    async fn tenant_bind(
        &self,
        plugin_id: &str,
        req: &TenantBindRequest,
    ) -> KeelResult<CommonResult> {
        self.record(format!("tenant_bind {} {}", plugin_id, req.tenant_id));
        if self.state.lock().unwrap().reject_tenant.contains(plugin_id) {
            return Ok(refused("tenant rejected"));
        }
        Ok(CommonResult::ok())
    }
}

// ============================================================================
// Failure injection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Create,
    Update,
    Delete,
}

/// Store wrapper that fails chosen writes
pub struct FailingStateStore {
    inner: Arc<dyn StateStore>,
    rules: Mutex<Vec<(StoreOp, String)>>,
}

impl FailingStateStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self {
            inner,
            rules: Mutex::new(Vec::new()),
        }
    }

    /// Fail every `op` on keys equal to `key`
    pub fn fail(&self, op: StoreOp, key: impl Into<String>) {
        self.rules.lock().unwrap().push((op, key.into()));
    }

    pub fn heal(&self) {
        self.rules.lock().unwrap().clear();
    }

    fn check(&self, op: StoreOp, key: &str) -> keel_state::Result<()> {
        let rules = self.rules.lock().unwrap();
        if rules.iter().any(|(o, k)| *o == op && k == key) {
            return Err(StateError::ConnectionError(format!("injected {:?} failure on {}", op, key)));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FailingStateStore {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn create(&self, key: &str, value: Bytes) -> keel_state::Result<String> {
        self.check(StoreOp::Create, key)?;
        self.inner.create(key, value).await
    }

    async fn create_with_ttl(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> keel_state::Result<String> {
        self.check(StoreOp::Create, key)?;
        self.inner.create_with_ttl(key, value, ttl).await
    }

    async fn update(&self, key: &str, value: Bytes, etag: &str) -> keel_state::Result<String> {
        self.check(StoreOp::Update, key)?;
        self.inner.update(key, value, etag).await
    }

    async fn get(&self, key: &str) -> keel_state::Result<StateItem> {
        self.inner.get(key).await
    }

    async fn list(&self, prefix: &str) -> keel_state::Result<Vec<StateItem>> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, key: &str) -> keel_state::Result<()> {
        self.check(StoreOp::Delete, key)?;
        self.inner.delete(key).await
    }
}

// ============================================================================
// Test environment
// ============================================================================

/// Registry, routes and membership with CAS tokens cleared
#[derive(Debug, PartialEq)]
pub struct StateSnapshot {
    pub plugins: Vec<Plugin>,
    pub routes: Vec<PluginRoute>,
    pub membership: Membership,
}

pub struct TestEnv {
    pub memory: Arc<MemoryStateStore>,
    pub store: Arc<FailingStateStore>,
    pub client: Arc<MockPluginClient>,
    pub state: Arc<AppState>,
    pub config: KeelsrvConfig,
}

impl TestEnv {
    pub fn new(platform_version: &str) -> Self {
        let mut config = KeelsrvConfig::default();
        config.service.platform_version = platform_version.to_string();
        config.store.key_prefix = "test:".to_string();
        Self::with_config(config)
    }

    pub fn with_config(config: KeelsrvConfig) -> Self {
        let memory = Arc::new(MemoryStateStore::new());
        let store = Arc::new(FailingStateStore::new(memory.clone()));
        let client = Arc::new(MockPluginClient::new());
        let state = Arc::new(AppState::new(config.clone(), store.clone(), client.clone()));
        Self {
            memory,
            store,
            client,
            state,
            config,
        }
    }

    pub fn keys(&self) -> keel_model::KeySpace {
        self.config.store.key_space()
    }

    /// Register a plain plugin, panicking on failure
    pub async fn register(&self, id: &str, tkeel_version: &str) -> PluginRoute {
        self.client.plugin(id, tkeel_version);
        self.state.orchestrator.register(id, None).await.unwrap().route
    }

    pub async fn route(&self, id: &str) -> Option<PluginRoute> {
        self.state.routes.get(id).await.unwrap()
    }

    /// Load the route table into the dispatcher's cache
    pub async fn refresh_cache(&self) {
        let routes = self.state.routes.list().await.unwrap();
        self.state
            .route_cache
            .replace(routes.into_iter().map(|r| (r.id.clone(), r)).collect());
    }

    /// Token the platform itself issued to `plugin_id`
    pub fn plugin_jwt(&self, plugin_id: &str) -> String {
        self.state
            .tokens
            .sign(plugin_id, Duration::from_secs(300))
            .unwrap()
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        let mut plugins = self.state.registry.list().await.unwrap();
        for p in &mut plugins {
            p.version.clear();
        }
        let mut routes = self.state.routes.list().await.unwrap();
        for r in &mut routes {
            r.version.clear();
        }
        StateSnapshot {
            plugins,
            routes,
            membership: self.state.membership.list().await.unwrap(),
        }
    }
}

/// JWT with a valid shape claiming `plugin_id`, signed with nothing
pub fn forged_jwt(plugin_id: &str) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"plugin_id":"{}"}}"#, plugin_id));
    format!("{}.{}.sig", header, payload)
}
