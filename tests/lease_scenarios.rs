//! End-to-end scenarios for the lease service: cold start, failover,
//! and mutual exclusion between two live replicas, driven through the
//! public API against the in-memory coordination store.

use std::sync::Arc;
use std::time::Duration;

use tso_ha::{
    LeaseConfig, LeaseManager, MemoryCoordinationStore, RecordingPanicker, SequenceStateManager, SystemClock,
    TsoRecord,
};

const LEASE_PERIOD_MS: u64 = 200;
const CURRENT: &str = "/omid/current-tso";

fn config() -> LeaseConfig {
    LeaseConfig {
        lease_period_ms: LEASE_PERIOD_MS,
        ..LeaseConfig::default()
    }
}

fn manager(
    host: &str,
    store: Arc<MemoryCoordinationStore>,
    first_epoch: u64,
    panicker: Arc<RecordingPanicker>,
) -> LeaseManager<MemoryCoordinationStore> {
    LeaseManager::new(
        host,
        config(),
        store,
        SequenceStateManager::starting_at(first_epoch),
        Arc::new(SystemClock),
        panicker,
    )
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
async fn eventually<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cold_start_sole_replica_becomes_master_and_advertises() {
    let store = MemoryCoordinationStore::new();
    let panicker = Arc::new(RecordingPanicker::new());
    let handle = manager("10.0.0.7:1234", store.clone(), 7, panicker.clone())
        .start()
        .await
        .expect("service startup");

    // Not master right after start; the first acquisition attempt only
    // fires after one lease period.
    assert!(!handle.in_lease_period());

    let view = handle.view();
    assert!(
        eventually(Duration::from_secs(3), || view.in_lease_period()).await,
        "replica never became master"
    );

    // Coordinates are published exactly once: one write on a freshly
    // created record leaves it at version 1.
    assert!(
        eventually(Duration::from_secs(3), || {
            futures_block(store.version_of(CURRENT)) == Some(1)
        })
        .await,
        "coordinates were never advertised"
    );
    let payload = store.value_of(CURRENT).await.unwrap();
    let record = TsoRecord::parse(&payload).unwrap();
    assert_eq!(record.host_and_port, "10.0.0.7:1234");
    assert_eq!(record.epoch, 7);

    handle.stop().await;
    assert!(panicker.calls().is_empty(), "unexpected panics: {:?}", panicker.calls());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn standby_takes_over_after_the_master_stops_renewing() {
    let store = MemoryCoordinationStore::new();
    let panicker_a = Arc::new(RecordingPanicker::new());
    let panicker_b = Arc::new(RecordingPanicker::new());

    let handle_a = manager("10.0.0.1:1234", store.clone(), 10, panicker_a.clone())
        .start()
        .await
        .expect("replica a startup");
    let view_a = handle_a.view();
    assert!(eventually(Duration::from_secs(3), || view_a.in_lease_period()).await);

    // Stopping does not release the lease record; the replica simply
    // stops renewing, exactly like a crashed scheduler.
    handle_a.stop().await;

    let handle_b = manager("10.0.0.2:2345", store.clone(), 100, panicker_b.clone())
        .start()
        .await
        .expect("replica b startup");
    let view_b = handle_b.view();
    assert!(
        eventually(Duration::from_secs(3), || view_b.in_lease_period()).await,
        "standby never took over"
    );

    // The old master's window has passed by the time the standby won.
    assert!(!view_a.in_lease_period());

    assert!(
        eventually(Duration::from_secs(3), || {
            futures_block(store.value_of(CURRENT))
                .and_then(|bytes| TsoRecord::parse(&bytes).ok())
                .is_some_and(|record| record.host_and_port == "10.0.0.2:2345")
        })
        .await,
        "standby never advertised its coordinates"
    );
    let record = TsoRecord::parse(&store.value_of(CURRENT).await.unwrap()).unwrap();
    assert_eq!(record.epoch, 100);

    handle_b.stop().await;
    assert!(panicker_a.calls().is_empty());
    assert!(panicker_b.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_live_replicas_are_never_both_master() {
    let store = MemoryCoordinationStore::new();
    let panicker_a = Arc::new(RecordingPanicker::new());
    let panicker_b = Arc::new(RecordingPanicker::new());

    let handle_a = manager("10.0.0.1:1234", store.clone(), 10, panicker_a.clone())
        .start()
        .await
        .expect("replica a startup");
    let handle_b = manager("10.0.0.2:2345", store.clone(), 20, panicker_b.clone())
        .start()
        .await
        .expect("replica b startup");

    let view_a = handle_a.view();
    let view_b = handle_b.view();
    assert!(
        eventually(Duration::from_secs(3), || {
            view_a.in_lease_period() || view_b.in_lease_period()
        })
        .await,
        "nobody became master"
    );

    // Sample the predicate pair across several lease periods.
    for _ in 0..50 {
        assert!(
            !(view_a.in_lease_period() && view_b.in_lease_period()),
            "both replicas claim mastership"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    handle_a.stop().await;
    handle_b.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_against_existing_records_succeeds() {
    let store = MemoryCoordinationStore::new();
    let panicker = Arc::new(RecordingPanicker::new());

    let first = manager("10.0.0.7:1234", store.clone(), 1, panicker.clone())
        .start()
        .await
        .expect("first startup");
    let view = first.view();
    assert!(eventually(Duration::from_secs(3), || view.in_lease_period()).await);
    first.stop().await;

    // Both coordination paths already exist; starting over is fine.
    let second = manager("10.0.0.7:1234", store.clone(), 2, panicker.clone())
        .start()
        .await
        .expect("second startup");
    let view = second.view();
    assert!(eventually(Duration::from_secs(3), || view.in_lease_period()).await);
    second.stop().await;

    assert!(panicker.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_returns_promptly() {
    let store = MemoryCoordinationStore::new();
    let panicker = Arc::new(RecordingPanicker::new());
    let handle = manager("10.0.0.7:1234", store, 1, panicker.clone())
        .start()
        .await
        .expect("service startup");
    let view = handle.view();
    assert!(eventually(Duration::from_secs(3), || view.in_lease_period()).await);

    tokio::time::timeout(Duration::from_secs(1), handle.stop())
        .await
        .expect("stop should complete well within a second");
    assert!(panicker.calls().is_empty());
}

/// Block on a small store future from inside a sync closure.
fn futures_block<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
}
