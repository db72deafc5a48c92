//! End-to-end tests of supervisors, managers and workers over a scripted driver.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use load_generator::orchestrator::PoolSupervisor;
use load_generator::store::MemoryStore;
use load_generator::target::record::{FIELD_BACKEND, FIELD_CONNECTIONS};
use load_generator::target::{BackendClass, TargetId, TargetRecord, Workload, WorkloadFlags};
use load_generator::ManagerState;

mod common;

use common::{context, target, wait_until, within, FakeDriver, Harness};

const WAIT: Duration = Duration::from_secs(5);

fn slots(range: std::ops::Range<usize>) -> BTreeSet<usize> {
    range.collect()
}

#[tokio::test]
async fn test_pools_converge_to_desired_counts() {
    let store = MemoryStore::new();
    store.put(&target("my-1", BackendClass::MySql, 2));
    store.put(&target("my-2", BackendClass::MySql, 3));
    store.put(&target("pg-1", BackendClass::Postgres, 1));
    let mut disabled = target("pg-2", BackendClass::Postgres, 4);
    disabled.enabled = false;
    store.put(&disabled);

    let h = Harness::start(store, &[BackendClass::MySql, BackendClass::Postgres]).await;
    let status = h.ctx.status.clone();

    let converged = wait_until(WAIT, || {
        status.live_workers(BackendClass::MySql, &"my-1".into()) == slots(0..2)
            && status.live_workers(BackendClass::MySql, &"my-2".into()) == slots(0..3)
            && status.live_workers(BackendClass::Postgres, &"pg-1".into()) == slots(0..1)
    })
    .await;
    assert!(converged, "pools did not converge");

    assert!(status.get(BackendClass::Postgres, &"pg-2".into()).is_none());
    assert!(wait_until(WAIT, || h.driver.live_connections() == 6).await);
    assert!(wait_until(WAIT, || h.driver.runs("my-2") > 0 && h.driver.runs("pg-1") > 0).await);
    assert_eq!(h.driver.runs("pg-2"), 0);

    within(WAIT, h.orchestrator.shutdown()).await;
}

#[tokio::test]
async fn test_shutdown_leaves_no_workers() {
    let store = MemoryStore::new();
    store.put(&target("my-1", BackendClass::MySql, 4));
    store.put(&target("mg-1", BackendClass::MongoDb, 2));

    let h = Harness::start(store, &[BackendClass::MySql, BackendClass::MongoDb]).await;
    assert!(wait_until(WAIT, || h.driver.live_connections() == 6).await);

    let status = h.ctx.status.clone();
    within(WAIT, h.orchestrator.shutdown()).await;

    assert_eq!(h.driver.live_connections(), 0);
    assert_eq!(status.total_live_workers(), 0);
    assert_eq!(status.state(BackendClass::MySql, &"my-1".into()), Some(ManagerState::Stopped));
    assert_eq!(status.state(BackendClass::MongoDb, &"mg-1".into()), Some(ManagerState::Stopped));
}

#[tokio::test]
async fn test_root_cancel_then_join_leaves_no_workers() {
    let store = MemoryStore::new();
    store.put(&target("pg-1", BackendClass::Postgres, 3));

    let h = Harness::start(store, &[BackendClass::Postgres]).await;
    assert!(wait_until(WAIT, || h.driver.live_connections() == 3).await);

    h.root.cancel();
    within(WAIT, h.orchestrator.join()).await;
    assert_eq!(h.driver.live_connections(), 0);
}

#[tokio::test]
async fn test_same_count_twice_does_not_respawn() {
    let store = MemoryStore::new();
    store.put(&target("my-1", BackendClass::MySql, 3));

    let h = Harness::start(store, &[BackendClass::MySql]).await;
    let id = TargetId::from("my-1");
    let status = h.ctx.status.clone();
    assert!(wait_until(WAIT, || h.driver.live_connections_for("my-1") == 3).await);
    let connects = h.driver.connects("my-1");

    // Rewrite the record with the same count; refresher and manager ticks pass.
    h.store.update(&id, |t| t.connections = 3);
    tokio::time::sleep(Duration::from_millis(200)).await;
    h.store.update(&id, |t| t.connections = 3);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(status.live_workers(BackendClass::MySql, &id), slots(0..3));
    assert_eq!(h.driver.connects("my-1"), connects);
    assert_eq!(status.get(BackendClass::MySql, &id).unwrap().restarts, 0);

    within(WAIT, h.orchestrator.shutdown()).await;
}

#[tokio::test]
async fn test_unhealthy_target_does_not_affect_others() {
    let store = MemoryStore::new();
    store.put(&target("a", BackendClass::MySql, 2));
    store.put(&target("b", BackendClass::MySql, 3));

    let h = Harness::start(store, &[BackendClass::MySql]).await;
    let status = h.ctx.status.clone();
    let (a, b) = (TargetId::from("a"), TargetId::from("b"));
    assert!(
        wait_until(WAIT, || {
            h.driver.live_connections_for("a") == 2 && h.driver.live_connections_for("b") == 3
        })
        .await
    );
    let b_connects = h.driver.connects("b");

    h.driver.set_healthy("fake://a", false);
    assert!(wait_until(WAIT, || status.live_workers(BackendClass::MySql, &a).is_empty()).await);

    // A malformed edit to A is ignored and must not disturb B either.
    h.store.put_record(
        TargetRecord::from(&target("a", BackendClass::MySql, 2)).with(FIELD_CONNECTIONS, "-1"),
    );
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(status.live_workers(BackendClass::MySql, &b), slots(0..3));
    assert_eq!(status.state(BackendClass::MySql, &b), Some(ManagerState::Running));
    assert_eq!(h.driver.connects("b"), b_connects);
    assert_eq!(status.get(BackendClass::MySql, &b).unwrap().restarts, 0);

    within(WAIT, h.orchestrator.shutdown()).await;
}

#[tokio::test]
async fn test_pool_restarts_after_health_loss() {
    let store = MemoryStore::new();
    store.put(&target("a", BackendClass::Postgres, 3));

    let h = Harness::start(store, &[BackendClass::Postgres]).await;
    let status = h.ctx.status.clone();
    let a = TargetId::from("a");
    assert!(wait_until(WAIT, || h.driver.live_connections_for("a") == 3).await);

    h.driver.set_healthy("fake://a", false);
    assert!(
        wait_until(WAIT, || {
            status.get(BackendClass::Postgres, &a).map(|s| s.restarts).unwrap_or(0) >= 1
                && status.live_workers(BackendClass::Postgres, &a).is_empty()
        })
        .await,
        "workers should be cancelled after health loss"
    );
    assert!(wait_until(WAIT, || status.state(BackendClass::Postgres, &a) == Some(ManagerState::Connecting)).await);
    assert_eq!(h.driver.live_connections_for("a"), 0);
    assert_eq!(h.store.status(&a).as_deref(), Some("Error: scripted failure"));

    h.driver.set_healthy("fake://a", true);
    assert!(
        wait_until(WAIT, || {
            status.state(BackendClass::Postgres, &a) == Some(ManagerState::Running)
                && status.live_workers(BackendClass::Postgres, &a) == slots(0..3)
                && h.driver.live_connections_for("a") == 3
        })
        .await,
        "pool should come back with the same size"
    );
    assert_eq!(h.store.status(&a).as_deref(), Some("Connected"));

    within(WAIT, h.orchestrator.shutdown()).await;
}

#[tokio::test]
async fn test_resize_sequence_then_removal() {
    let store = MemoryStore::new();
    store.put(&target("t", BackendClass::MySql, 0));

    let h = Harness::start(store, &[BackendClass::MySql]).await;
    let status = h.ctx.status.clone();
    let id = TargetId::from("t");

    assert!(wait_until(WAIT, || status.state(BackendClass::MySql, &id) == Some(ManagerState::Running)).await);
    assert!(status.live_workers(BackendClass::MySql, &id).is_empty());

    for (count, expected) in [(3, slots(0..3)), (5, slots(0..5)), (2, slots(0..2))] {
        h.store.update(&id, |t| t.connections = count);
        assert!(
            wait_until(WAIT, || {
                status.live_workers(BackendClass::MySql, &id) == expected
                    && h.driver.live_connections_for("t") == count
            })
            .await,
            "pool did not reach {} workers",
            count
        );
    }

    h.store.remove(&id);
    assert!(wait_until(WAIT, || status.state(BackendClass::MySql, &id) == Some(ManagerState::Stopped)).await);
    assert!(status.live_workers(BackendClass::MySql, &id).is_empty());
    assert!(wait_until(WAIT, || h.driver.live_connections_for("t") == 0).await);

    within(WAIT, h.orchestrator.shutdown()).await;
}

#[tokio::test]
async fn test_disabled_then_reenabled_target_gets_one_manager() {
    let store = MemoryStore::new();
    store.put(&target("t", BackendClass::MongoDb, 2));

    let h = Harness::start(store, &[BackendClass::MongoDb]).await;
    let status = h.ctx.status.clone();
    let id = TargetId::from("t");
    assert!(wait_until(WAIT, || h.driver.live_connections_for("t") == 2).await);

    h.store.update(&id, |t| t.enabled = false);
    assert!(wait_until(WAIT, || status.state(BackendClass::MongoDb, &id) == Some(ManagerState::Stopped)).await);

    h.store.update(&id, |t| t.enabled = true);
    assert!(
        wait_until(WAIT, || {
            status.state(BackendClass::MongoDb, &id) == Some(ManagerState::Running)
                && h.driver.live_connections_for("t") == 2
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.driver.live_connections_for("t"), 2);

    within(WAIT, h.orchestrator.shutdown()).await;
}

#[tokio::test]
async fn test_unknown_backend_edit_keeps_running_pool() {
    let store = MemoryStore::new();
    store.put(&target("a", BackendClass::MySql, 2));

    let h = Harness::start(store, &[BackendClass::MySql]).await;
    let status = h.orchestrator.status().clone();
    let a = TargetId::from("a");
    assert!(wait_until(WAIT, || h.driver.live_connections_for("a") == 2).await);
    let connects = h.driver.connects("a");

    h.store.put_record(
        TargetRecord::from(&target("a", BackendClass::MySql, 5)).with(FIELD_BACKEND, "mysqll"),
    );
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(status.state(BackendClass::MySql, &a), Some(ManagerState::Running));
    assert_eq!(status.live_workers(BackendClass::MySql, &a), slots(0..2));
    assert_eq!(h.driver.live_connections_for("a"), 2);
    assert_eq!(h.driver.connects("a"), connects);

    // Once the record parses again its new count applies to the same pool.
    h.store.put(&target("a", BackendClass::MySql, 3));
    assert!(wait_until(WAIT, || status.live_workers(BackendClass::MySql, &a) == slots(0..3)).await);
    assert_eq!(status.get(BackendClass::MySql, &a).unwrap().restarts, 0);

    within(WAIT, h.orchestrator.shutdown()).await;
}

#[tokio::test]
async fn test_query_errors_keep_the_connection() {
    let store = MemoryStore::new();
    store.put(&target("q", BackendClass::MySql, 2));

    let h = Harness::start(store, &[BackendClass::MySql]).await;
    let status = h.ctx.status.clone();
    let q = TargetId::from("q");
    assert!(wait_until(WAIT, || h.driver.live_connections_for("q") == 2).await);
    let connects = h.driver.connects("q");

    h.driver.set_query_failure("q", true);
    assert!(
        wait_until(WAIT, || h.driver.query_failures("q") >= 20).await,
        "workers should keep iterating after query errors"
    );

    assert_eq!(h.driver.connects("q"), connects);
    assert_eq!(h.driver.live_connections_for("q"), 2);
    assert_eq!(status.state(BackendClass::MySql, &q), Some(ManagerState::Running));
    assert_eq!(status.live_workers(BackendClass::MySql, &q), slots(0..2));

    h.driver.set_query_failure("q", false);
    let failures = h.driver.query_failures("q");
    let runs = h.driver.runs("q");
    assert!(wait_until(WAIT, || h.driver.runs("q") > runs + 10).await);
    assert_eq!(h.driver.query_failures("q"), failures);
    assert_eq!(h.driver.connects("q"), connects);

    within(WAIT, h.orchestrator.shutdown()).await;
}

#[tokio::test]
async fn test_workload_and_sleep_edits_reach_running_workers() {
    let store = MemoryStore::new();
    store.put(&target("w", BackendClass::Postgres, 2));

    let h = Harness::start(store, &[BackendClass::Postgres]).await;
    let status = h.ctx.status.clone();
    let w = TargetId::from("w");
    assert!(wait_until(WAIT, || h.driver.workload_runs("w", Workload::Repositories) > 0).await);
    assert_eq!(h.driver.workload_runs("w", Workload::Pulls), 0);
    let connects = h.driver.connects("w");

    h.store.update(&w, |t| {
        t.workloads = WorkloadFlags {
            switch2: true,
            ..WorkloadFlags::default()
        }
    });
    assert!(wait_until(WAIT, || h.driver.workload_runs("w", Workload::Pulls) > 0).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let repositories = h.driver.workload_runs("w", Workload::Repositories);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.driver.workload_runs("w", Workload::Repositories), repositories);

    // A long inter-iteration delay parks every worker after its next iteration.
    h.store.update(&w, |t| t.sleep_ms = 60_000);
    tokio::time::sleep(Duration::from_millis(150)).await;
    let runs = h.driver.runs("w");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.driver.runs("w"), runs);

    assert_eq!(h.driver.connects("w"), connects);
    assert_eq!(status.live_workers(BackendClass::Postgres, &w), slots(0..2));
    assert_eq!(status.get(BackendClass::Postgres, &w).unwrap().restarts, 0);

    within(WAIT, h.orchestrator.shutdown()).await;
}

#[tokio::test]
async fn test_cancel_while_connecting_starts_no_workers() {
    let store = MemoryStore::new();
    store.put(&target("down", BackendClass::MongoDb, 3));
    store.put(&target("down-2", BackendClass::MongoDb, 2));
    let driver = FakeDriver::new();
    driver.set_healthy("fake://down", false);
    driver.set_healthy("fake://down-2", false);

    let h = Harness::start_with(store, driver, &[BackendClass::MongoDb]).await;
    let status = h.ctx.status.clone();
    let (down, down_2) = (TargetId::from("down"), TargetId::from("down-2"));

    assert!(wait_until(WAIT, || status.state(BackendClass::MongoDb, &down) == Some(ManagerState::Connecting)).await);
    assert!(wait_until(WAIT, || h.store.status(&down).is_some()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.store.status(&down).as_deref(), Some("Error: scripted failure"));

    // Removal cancels the manager mid-backoff.
    h.store.remove(&down);
    assert!(wait_until(WAIT, || status.state(BackendClass::MongoDb, &down) == Some(ManagerState::Stopped)).await);
    assert!(status.live_workers(BackendClass::MongoDb, &down).is_empty());
    assert_eq!(status.get(BackendClass::MongoDb, &down).unwrap().restarts, 0);
    assert_eq!(h.driver.connects("down"), 0);

    // Shutdown reaches the other one the same way.
    within(WAIT, h.orchestrator.shutdown()).await;
    assert_eq!(status.state(BackendClass::MongoDb, &down_2), Some(ManagerState::Stopped));
    assert_eq!(h.driver.connects("down-2"), 0);
    assert_eq!(status.total_live_workers(), 0);
}

#[tokio::test]
async fn test_supervisor_reconcile_tracks_enabled_targets() {
    let store = MemoryStore::new();
    store.put(&target("a", BackendClass::MySql, 1));
    store.put(&target("b", BackendClass::MySql, 1));
    store.put(&target("p", BackendClass::Postgres, 1));
    let driver = FakeDriver::new();
    let (ctx, mut refresher) = context(&store, &driver, &[BackendClass::MySql, BackendClass::Postgres]);
    refresher.refresh_now().await;

    let mut supervisor = PoolSupervisor::new(Arc::clone(&ctx), BackendClass::MySql);
    assert_eq!(supervisor.backend(), BackendClass::MySql);

    let cancel = CancellationToken::new();
    supervisor.reconcile(&cancel).await;
    supervisor.reconcile(&cancel).await;
    assert_eq!(supervisor.live_ids(), vec![TargetId::from("a"), TargetId::from("b")]);
    assert!(wait_until(WAIT, || driver.live_connections() == 2).await);

    store.remove(&"b".into());
    refresher.refresh_now().await;
    supervisor.reconcile(&cancel).await;
    assert_eq!(supervisor.live_ids(), vec![TargetId::from("a")]);

    cancel.cancel();
    within(WAIT, supervisor.run(cancel.clone())).await;
    assert_eq!(driver.live_connections(), 0);
    assert_eq!(driver.connects("p"), 0);
}
