//! Prefix watch by polling
//!
//! Backends without change notification are watched by listing a prefix on
//! an interval. The callback receives the full snapshot whenever any key,
//! etag or value under the prefix changed since the previous delivery.

use crate::traits::{StateItem, StateStore};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Fingerprint = Vec<(String, String, Bytes)>;

/// Identity of a snapshot: every key with its etag and value
fn fingerprint(items: &[StateItem]) -> Fingerprint {
    items
        .iter()
        .map(|i| (i.key.clone(), i.etag.clone(), i.value.clone()))
        .collect()
}

/// Poll `prefix` every `interval` until `cancel` fires
///
/// The first successful listing is always delivered. List failures are
/// logged and retried on the next tick.
pub fn watch_prefix<F>(
    store: Arc<dyn StateStore>,
    prefix: String,
    interval: Duration,
    cancel: CancellationToken,
    mut on_change: F,
) -> JoinHandle<()>
where
    F: FnMut(Vec<StateItem>) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last: Option<Fingerprint> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Watch on {} stopped", prefix);
                    break;
                }
                _ = ticker.tick() => {}
            }

            match store.list(&prefix).await {
                Ok(items) => {
                    let current = fingerprint(&items);
                    if last.as_ref() != Some(&current) {
                        debug!("Watch {}: {} items changed", prefix, items.len());
                        last = Some(current);
                        on_change(items);
                    }
                },
                Err(e) => warn!("Watch {} list failed: {}", prefix, e),
            }
        }
    })
}
