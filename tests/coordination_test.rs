//! End-to-end coordination scenarios (§8), run against `FakeStore` so they
//! are deterministic and need no live coordination-store instance.

use std::sync::Arc;
use std::time::Duration;

use argus::collaborators::{InMemoryCandidateSource, InMemoryLedger, NoopAnalyzer, StaticCveLookup};
use argus::config::Settings;
use argus::consensus::ConsensusDriver;
use argus::executor::Executor;
use argus::role::RoleLoop;
use argus::shutdown::shutdown_channel;
use argus::store::{FakeStore, Keys, Store};
use argus::supervisor::Supervisor;

fn fast_settings(node_id: &str) -> Settings {
    Settings {
        node_id: node_id.to_string(),
        lease_ttl: Duration::from_millis(200),
        heartbeat_interval: Duration::from_millis(20),
        key_prefix: "argus".to_string(),
        admit_fraction: 0.5,
        graph_search_interval: Duration::from_millis(30),
        task_timeout: Duration::from_millis(20),
        missed_beacon_threshold: 3,
        node_health_ttl: Duration::from_secs(10),
    }
}

fn build_supervisor(store: Arc<dyn Store>, node_id: &str) -> Arc<Supervisor> {
    let keys = Keys::new("argus");
    let settings = fast_settings(node_id);
    let consensus = Arc::new(ConsensusDriver::new(
        store.clone(),
        keys.clone(),
        node_id.to_string(),
        settings.lease_ttl,
        settings.node_health_ttl,
        settings.missed_beacon_threshold,
    ));
    Arc::new(Supervisor::new(
        store,
        keys,
        settings,
        consensus,
        Arc::new(InMemoryCandidateSource::with_default_clusters()),
        Arc::new(NoopAnalyzer),
        Arc::new(StaticCveLookup::with_default_database()),
        Arc::new(InMemoryLedger::new()),
    ))
}

#[tokio::test]
async fn solo_node_bootstraps_as_leader_and_drains_its_own_queue() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let supervisor = build_supervisor(store.clone(), "node-solo");
    let (controller, signal) = shutdown_channel();

    let run = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.run(signal).await }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        store.get(&Keys::new("argus").leader()).await.unwrap().as_deref(),
        Some("node-solo")
    );

    controller.shutdown();
    tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("supervisor should shut down promptly")
        .unwrap();
}

#[tokio::test]
async fn three_nodes_elect_exactly_one_leader() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let supervisors: Vec<_> = ["node-a", "node-b", "node-c"]
        .iter()
        .map(|id| build_supervisor(store.clone(), id))
        .collect();

    let (controller, signal) = shutdown_channel();
    let runs: Vec<_> = supervisors
        .iter()
        .map(|s| {
            let s = s.clone();
            let signal = signal.clone();
            tokio::spawn(async move { s.run(signal).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let leader = store.get(&Keys::new("argus").leader()).await.unwrap();
    assert!(leader.is_some());
    assert!(["node-a", "node-b", "node-c"].contains(&leader.unwrap().as_str()));

    controller.shutdown();
    for run in runs {
        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("supervisor should shut down promptly")
            .unwrap();
    }
}

#[tokio::test]
async fn a_second_node_takes_over_after_the_leader_vanishes_uncleanly() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let a = build_supervisor(store.clone(), "node-a");
    let b = build_supervisor(store.clone(), "node-b");

    let (_a_controller, a_signal) = shutdown_channel();
    let (b_controller, b_signal) = shutdown_channel();

    let a_run = tokio::spawn({
        let a = a.clone();
        async move { a.run(a_signal).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        store.get(&Keys::new("argus").leader()).await.unwrap().as_deref(),
        Some("node-a")
    );

    // Simulate node-a vanishing without a clean shutdown (no abdicate, no
    // lease delete): abort the task outright and let the lease's TTL expire.
    a_run.abort();

    let b_run = tokio::spawn({
        let b = b.clone();
        async move { b.run(b_signal).await }
    });

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        store.get(&Keys::new("argus").leader()).await.unwrap().as_deref(),
        Some("node-b")
    );

    b_controller.shutdown();
    tokio::time::timeout(Duration::from_secs(2), b_run)
        .await
        .expect("node-b should shut down promptly")
        .unwrap();
}

#[tokio::test]
async fn graceful_shutdown_releases_the_lease_immediately() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let supervisor = build_supervisor(store.clone(), "node-a");
    let (controller, signal) = shutdown_channel();

    let run = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.run(signal).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.get(&Keys::new("argus").leader()).await.unwrap().is_some());

    controller.shutdown();
    tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("supervisor should shut down promptly")
        .unwrap();

    assert_eq!(store.get(&Keys::new("argus").leader()).await.unwrap(), None);
    assert_eq!(
        store
            .get(&Keys::new("argus").node("node-a"))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn store_outage_is_logged_and_does_not_crash_the_supervisor() {
    // A store whose every call fails, modeling an unreachable coordination
    // store after startup. The supervisor must keep running (as a
    // non-leader) rather than panic.
    struct FailingStore;

    #[async_trait::async_trait]
    impl Store for FailingStore {
        async fn try_claim(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Duration,
        ) -> Result<bool, argus::store::StoreError> {
            Err(argus::store::StoreError::Connection("unreachable".into()))
        }
        async fn set_with_ttl(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Duration,
        ) -> Result<(), argus::store::StoreError> {
            Err(argus::store::StoreError::Connection("unreachable".into()))
        }
        async fn get(&self, _key: &str) -> Result<Option<String>, argus::store::StoreError> {
            Err(argus::store::StoreError::Connection("unreachable".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), argus::store::StoreError> {
            Err(argus::store::StoreError::Connection("unreachable".into()))
        }
        async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), argus::store::StoreError> {
            Err(argus::store::StoreError::Connection("unreachable".into()))
        }
        async fn incr(&self, _key: &str) -> Result<i64, argus::store::StoreError> {
            Err(argus::store::StoreError::Connection("unreachable".into()))
        }
        async fn scan_prefix(&self, _pattern: &str) -> Result<Vec<String>, argus::store::StoreError> {
            Err(argus::store::StoreError::Connection("unreachable".into()))
        }
        async fn push_back(
            &self,
            _key: &str,
            _items: &[String],
        ) -> Result<i64, argus::store::StoreError> {
            Err(argus::store::StoreError::Connection("unreachable".into()))
        }
        async fn pop_front_blocking(
            &self,
            _key: &str,
            _timeout: Duration,
        ) -> Result<Option<(String, String)>, argus::store::StoreError> {
            Err(argus::store::StoreError::Connection("unreachable".into()))
        }
    }

    let store: Arc<dyn Store> = Arc::new(FailingStore);
    let supervisor = build_supervisor(store, "node-a");
    let (controller, signal) = shutdown_channel();

    let run = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.run(signal).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    controller.shutdown();
    tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("supervisor should still shut down cleanly despite store errors")
        .unwrap();
}

#[tokio::test]
async fn two_followers_drain_a_pre_seeded_queue_exactly_once_each() {
    // Exercises the follower side alone: no election, just two executors
    // racing on the same queue against a pre-seeded work_queue.
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let keys = Keys::new("argus");

    let items: Vec<String> = (0..20).map(|i| format!("item-{i}")).collect();
    store.push_back(&keys.work_queue(), &items).await.unwrap();

    let ledger = Arc::new(InMemoryLedger::new());
    let mut settings = fast_settings("node-a");
    settings.task_timeout = Duration::from_millis(50);

    let executor_a = Arc::new(Executor::new(
        store.clone(),
        keys.clone(),
        settings.clone(),
        Arc::new(NoopAnalyzer),
        Arc::new(StaticCveLookup::with_default_database()),
        ledger.clone(),
    ));
    let executor_b = Arc::new(Executor::new(
        store.clone(),
        keys.clone(),
        settings,
        Arc::new(NoopAnalyzer),
        Arc::new(StaticCveLookup::with_default_database()),
        ledger.clone(),
    ));

    let run_a = tokio::spawn(executor_a.clone().run());
    let run_b = tokio::spawn(executor_b.clone().run());

    // Every item should drain well within this window; poll rather than
    // sleep a single fixed duration so the test isn't flaky under load.
    for _ in 0..100 {
        if ledger.entries().len() == 20 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    executor_a.request_stop();
    executor_b.request_stop();
    tokio::time::timeout(Duration::from_secs(2), run_a)
        .await
        .expect("executor-a should stop promptly")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), run_b)
        .await
        .expect("executor-b should stop promptly")
        .unwrap();

    let entries = ledger.entries();
    assert_eq!(entries.len(), 20, "every item must be processed exactly once");
    let mut processed: Vec<String> = entries.into_iter().map(|r| r.item).collect();
    processed.sort();
    let mut expected = items.clone();
    expected.sort();
    assert_eq!(processed, expected);

    assert_eq!(
        store
            .pop_front_blocking(&keys.work_queue(), Duration::from_millis(10))
            .await
            .unwrap(),
        None,
        "work_queue must be empty once draining completes"
    );
}
