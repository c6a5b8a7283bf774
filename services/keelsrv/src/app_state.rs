//! Application State Management
//!
//! Central application state that is shared across all API handlers

use std::sync::Arc;
use std::time::Instant;

use keel_model::KeySpace;
use keel_state::StateStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::KeelsrvConfig;
use crate::dispatcher::{AllowAll, Authenticator, Dispatcher, EchoForwarder, Forwarder};
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::plugin_client::PluginClient;
use crate::reconcile::{ReconcileSettings, Reconciler};
use crate::registry::{MembershipIndex, PluginRegistry, StatePluginRegistry};
use crate::route_cache::RouteCache;
use crate::route_table::{RouteTable, StateRouteTable};
use crate::tenant::{TenantIndex, TenantManager};
use crate::token::{TokenIssuer, TokenSettings};

/// Application state containing shared resources
pub struct AppState {
    pub config: Arc<KeelsrvConfig>,
    pub store: Arc<dyn StateStore>,
    pub registry: Arc<dyn PluginRegistry>,
    pub routes: Arc<dyn RouteTable>,
    pub membership: Arc<MembershipIndex>,
    pub orchestrator: Arc<Orchestrator>,
    pub tenants: Arc<TenantManager>,
    pub tokens: Arc<TokenIssuer>,
    pub route_cache: Arc<RouteCache>,
    pub dispatcher: Arc<Dispatcher>,
    /// Transport for resolved gateway requests
    pub forwarder: Arc<dyn Forwarder>,
    pub reconciler: Arc<Reconciler>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every component over `store`, calling plugins through `client`
    pub fn new(
        config: KeelsrvConfig,
        store: Arc<dyn StateStore>,
        client: Arc<dyn PluginClient>,
    ) -> Self {
        Self::with_gateway(config, store, client, Arc::new(AllowAll), Arc::new(EchoForwarder))
    }

    /// Same as [`AppState::new`] with explicit gateway collaborators
    pub fn with_gateway(
        config: KeelsrvConfig,
        store: Arc<dyn StateStore>,
        client: Arc<dyn PluginClient>,
        authenticator: Arc<dyn Authenticator>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        let keys: KeySpace = config.store.key_space();

        let registry: Arc<dyn PluginRegistry> =
            Arc::new(StatePluginRegistry::new(store.clone(), keys.clone()));
        let routes: Arc<dyn RouteTable> =
            Arc::new(StateRouteTable::new(store.clone(), keys.clone()));
        let membership = Arc::new(MembershipIndex::new(store.clone(), keys.clone()));
        let tenant_index = Arc::new(TenantIndex::new(store.clone(), keys.clone()));

        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            routes.clone(),
            membership.clone(),
            tenant_index.clone(),
            client.clone(),
            OrchestratorSettings {
                platform_version: config.service.platform_version.clone(),
                timeout: config.registration.timeout,
            },
        ));
        let tenants = Arc::new(TenantManager::new(
            routes.clone(),
            registry.clone(),
            tenant_index,
            client.clone(),
        ));
        let tokens = Arc::new(TokenIssuer::new(
            registry.clone(),
            TokenSettings {
                secret: config.token.secret.clone(),
                issuer: config.token.issuer.clone(),
                audience: config.token.audience.clone(),
                ttl: config.token.ttl,
            },
        ));

        let route_cache = Arc::new(RouteCache::new());
        let dispatcher = Arc::new(Dispatcher::new(
            route_cache.clone(),
            tokens.clone(),
            authenticator,
        ));

        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            keys,
            routes.clone(),
            membership.clone(),
            client,
            ReconcileSettings {
                interval: config.reconcile.interval,
                max_jitter: config.reconcile.max_jitter,
                lock_ttl: config.reconcile.lock_ttl,
            },
        ));

        Self {
            config: Arc::new(config),
            store,
            registry,
            routes,
            membership,
            orchestrator,
            tenants,
            tokens,
            route_cache,
            dispatcher,
            forwarder,
            reconciler,
            started_at: Instant::now(),
        }
    }

    /// Start the route watch consumer and the reconciler
    pub fn spawn_background(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        info!(
            "Starting route watch every {:?}, reconcile every {:?}",
            self.config.route_watch.interval, self.config.reconcile.interval
        );
        vec![
            self.route_cache.follow(
                self.routes.as_ref(),
                self.config.route_watch.interval,
                cancel.child_token(),
            ),
            self.reconciler.clone().spawn(cancel.child_token()),
        ]
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
