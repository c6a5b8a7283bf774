//! Status reconciliation across control-plane instances

#![allow(clippy::disallowed_methods)] // Integration test - unwrap is acceptable

mod common;

use common::TestEnv;
use keel_model::PluginStatus;
use keelsrv::reconcile::{ReconcileSettings, Reconciler};
use keelsrv::registry::MembershipIndex;
use keelsrv::route_table::StateRouteTable;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A second instance sharing the first one's store
fn peer(env: &TestEnv) -> Reconciler {
    let keys = env.keys();
    Reconciler::new(
        env.store.clone(),
        keys.clone(),
        Arc::new(StateRouteTable::new(env.store.clone(), keys.clone())),
        Arc::new(MembershipIndex::new(env.store.clone(), keys)),
        env.client.clone(),
        ReconcileSettings {
            interval: Duration::from_secs(30),
            max_jitter: Duration::ZERO,
            lock_ttl: Duration::from_secs(30),
        },
    )
}

#[tokio::test]
async fn test_tick_writes_changed_status() {
    let env = TestEnv::new("v1.0.0");
    env.register("core", "v1.0.0").await;
    env.register("ext", "v1.0.0").await;
    env.client.set_status("core", PluginStatus::Stopped);

    let report = env.state.reconciler.tick().await.unwrap();
    assert!(report.scanned);
    assert_eq!(report.checked, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.failed, 0);

    assert_eq!(env.route("core").await.unwrap().status, PluginStatus::Stopped);
    assert_eq!(env.route("ext").await.unwrap().status, PluginStatus::Running);
    let membership = env.state.membership.list().await.unwrap();
    assert_eq!(membership.get("core"), Some(&PluginStatus::Stopped));
}

#[tokio::test]
async fn test_failing_plugins_are_counted_not_fatal() {
    let env = TestEnv::new("v1.0.0");
    env.register("core", "v1.0.0").await;
    env.register("ext", "v1.0.0").await;
    env.client.fail_status_of("core");
    env.client.set_status("ext", PluginStatus::Failed);

    let report = env.state.reconciler.tick().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(env.route("core").await.unwrap().status, PluginStatus::Running);
    assert_eq!(env.route("ext").await.unwrap().status, PluginStatus::Failed);
}

#[tokio::test]
async fn test_concurrent_instances_scan_once() {
    let env = TestEnv::new("v1.0.0");
    env.register("core", "v1.0.0").await;
    let other = peer(&env);

    let (a, b) = tokio::join!(env.state.reconciler.tick(), other.tick());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.scanned ^ b.scanned);
    assert_eq!(a.checked + b.checked, 1);
}

#[tokio::test(start_paused = true)]
async fn test_lock_expires_after_ttl() {
    let env = TestEnv::new("v1.0.0");
    let other = peer(&env);

    assert!(env.state.reconciler.tick().await.unwrap().scanned);
    assert!(!other.tick().await.unwrap().scanned);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(other.tick().await.unwrap().scanned);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_loop_reconciles_until_cancelled() {
    let env = TestEnv::new("v1.0.0");
    env.register("core", "v1.0.0").await;
    env.client.set_status("core", PluginStatus::Stopping);

    let cancel = CancellationToken::new();
    let handle = Arc::new(peer(&env)).spawn(cancel.clone());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(env.route("core").await.unwrap().status, PluginStatus::Stopping);

    cancel.cancel();
    handle.await.unwrap();
}
