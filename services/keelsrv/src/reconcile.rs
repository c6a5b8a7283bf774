//! Status reconciliation loop
//!
//! Every tick (base interval plus random jitter) one control-plane instance
//! takes the TTL scrape lock, asks every registered plugin for its status and
//! writes changed statuses back to the route table. Instances that find the
//! lock taken skip the tick; the lock is never released, only expired.

use crate::error::store_err;
use crate::plugin_client::{ensure_ok, PluginClient};
use crate::registry::MembershipIndex;
use crate::route_table::RouteTable;
use errors::{KeelError, KeelResult};
use keel_model::KeySpace;
use keel_state::{Bytes, StateError, StateStore};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub interval: Duration,
    pub max_jitter: Duration,
    pub lock_ttl: Duration,
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// False when another instance held the scrape lock
    pub scanned: bool,
    pub checked: usize,
    pub updated: usize,
    pub failed: usize,
}

pub struct Reconciler {
    store: Arc<dyn StateStore>,
    keys: KeySpace,
    routes: Arc<dyn RouteTable>,
    membership: Arc<MembershipIndex>,
    client: Arc<dyn PluginClient>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn StateStore>,
        keys: KeySpace,
        routes: Arc<dyn RouteTable>,
        membership: Arc<MembershipIndex>,
        client: Arc<dyn PluginClient>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            store,
            keys,
            routes,
            membership,
            client,
            settings,
        }
    }

    /// Try to take the scrape lock for one TTL window
    pub async fn acquire_lock(&self) -> KeelResult<bool> {
        let holder = Bytes::from(uuid::Uuid::new_v4().to_string());
        match self
            .store
            .create_with_ttl(&self.keys.scrape_lock(), holder, self.settings.lock_ttl)
            .await
        {
            Ok(_) => Ok(true),
            Err(StateError::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(store_err(e)),
        }
    }

    /// One reconciliation pass
    pub async fn tick(&self) -> KeelResult<TickReport> {
        let mut report = TickReport::default();
        if !self.acquire_lock().await? {
            debug!("Scrape lock held elsewhere, skipping tick");
            return Ok(report);
        }
        report.scanned = true;

        for (plugin_id, _) in self.membership.list().await? {
            report.checked += 1;
            match self.reconcile_one(&plugin_id).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {},
                Err(e) => {
                    warn!("Reconcile {}: {}", plugin_id, e);
                    report.failed += 1;
                },
            }
        }

        if report.updated > 0 || report.failed > 0 {
            info!(
                "Reconciled {} plugins: {} updated, {} failed",
                report.checked, report.updated, report.failed
            );
        }
        Ok(report)
    }

    /// Returns whether the stored status changed
    async fn reconcile_one(&self, plugin_id: &str) -> KeelResult<bool> {
        let resp = self.client.status(plugin_id).await?;
        ensure_ok(plugin_id, "status", &resp.res)?;

        let mut route = self
            .routes
            .get(plugin_id)
            .await?
            .ok_or_else(|| KeelError::not_found(format!("route {}", plugin_id)))?;
        if route.status == resp.status {
            return Ok(false);
        }

        let previous = route.status;
        route.status = resp.status;
        self.routes.update(&route).await?;
        self.membership.set_status(plugin_id, resp.status).await?;
        info!("Plugin {} status {} -> {}", plugin_id, previous, resp.status);
        Ok(true)
    }

    /// Interval plus a uniformly random jitter
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.settings.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.settings.interval + Duration::from_millis(jitter)
    }

    /// Run ticks until `cancel` fires
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let delay = self.next_delay();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Reconciler stopped");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                if let Err(e) = self.tick().await {
                    warn!("Reconcile tick failed: {}", e);
                }
            }
        })
    }
}
