//! In-memory route cache
//!
//! Readers load the current snapshot without locking. The watch consumer is
//! the only writer and replaces the whole map on every change.

use crate::route_table::{RouteSnapshot, RouteTable};
use arc_swap::ArcSwap;
use keel_model::PluginRoute;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
pub struct RouteCache {
    routes: ArcSwap<RouteSnapshot>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<PluginRoute> {
        self.routes.load().get(id).cloned()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.routes.load_full()
    }

    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn replace(&self, routes: RouteSnapshot) {
        debug!("Route cache refreshed with {} routes", routes.len());
        self.routes.store(Arc::new(routes));
    }

    /// Keep the cache in step with `table` until `cancel` fires
    pub fn follow(
        self: &Arc<Self>,
        table: &dyn RouteTable,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        table.watch(
            interval,
            cancel,
            Box::new(move |routes| cache.replace(routes)),
        )
    }
}
