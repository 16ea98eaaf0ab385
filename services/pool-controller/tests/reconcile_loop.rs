//! Queue-driven behaviour of the controller: triggers, retries and the run loop.

mod common;

use std::sync::Arc;
use std::time::Duration;

use nodepool_api::{update_state, ConditionStatus, PoolConditionType, WatchEvent};
use nodepool_controller::{ControllerConfig, InMemoryCluster};
use nodepool_testing::{ConfigurationBuilder, NodeBuilder, PoolBuilder};
use tokio::sync::watch;

use common::{cluster, controller, fast_config, NEW, OLD};

fn worker_cluster(count: usize) -> Arc<InMemoryCluster> {
    cluster(
        vec![PoolBuilder::new("worker").target(NEW).build()],
        (0..count)
            .map(|i| NodeBuilder::new(format!("worker-{i}")).role("worker").at(OLD).build())
            .collect(),
        vec![ConfigurationBuilder::new(NEW).build()],
    )
}

#[tokio::test]
async fn test_pool_events_are_debounced() {
    let cluster = worker_cluster(1);
    let controller = controller(&cluster, fast_config());
    let pool = cluster.pool("worker").unwrap();

    controller.handle_event(WatchEvent::PoolAdded(pool.clone()));
    assert_eq!(controller.queue().len(), 0);
    assert!(!controller.queue().is_idle());

    let key = tokio::time::timeout(Duration::from_secs(1), controller.queue().get())
        .await
        .unwrap();
    assert_eq!(key.as_deref(), Some("worker"));
}

#[tokio::test]
async fn test_pool_delete_is_log_only() {
    let cluster = worker_cluster(1);
    let controller = controller(&cluster, fast_config());

    controller.handle_event(WatchEvent::PoolDeleted(cluster.pool("worker").unwrap()));
    assert!(controller.queue().is_idle());
}

#[tokio::test]
async fn test_node_events_enqueue_owner() {
    let cluster = worker_cluster(1);
    let controller = controller(&cluster, fast_config());
    let node = cluster.node("worker-0").unwrap();

    controller.handle_event(WatchEvent::NodeAdded(node.clone()));
    assert_eq!(controller.queue().len(), 1);
    let key = controller.queue().get().await.unwrap();
    controller.queue().done(&key);

    controller.handle_event(WatchEvent::NodeDeleted(node));
    assert_eq!(controller.queue().len(), 1);
}

#[tokio::test]
async fn test_added_node_being_deleted_is_handled_as_delete() {
    let cluster = worker_cluster(0);
    let controller = controller(&cluster, fast_config());

    let node = NodeBuilder::new("worker-9").role("worker").at(OLD).deleting().build();
    controller.handle_event(WatchEvent::NodeAdded(node));
    assert_eq!(controller.queue().len(), 1);
}

#[tokio::test]
async fn test_node_updates_filtered_by_tracked_signals() {
    let cluster = worker_cluster(1);
    let controller = controller(&cluster, fast_config());
    let old = cluster.node("worker-0").unwrap();

    let relabelled = NodeBuilder::new("worker-0")
        .role("worker")
        .label("team", "storage")
        .at(OLD)
        .build();
    controller.handle_event(WatchEvent::NodeUpdated {
        old: old.clone(),
        new: relabelled,
    });
    assert!(controller.queue().is_idle());

    let working = NodeBuilder::new("worker-0")
        .role("worker")
        .updating(OLD, NEW)
        .build();
    controller.handle_event(WatchEvent::NodeUpdated { old, new: working });
    assert_eq!(controller.queue().len(), 1);
}

#[tokio::test]
async fn test_unmanaged_and_unowned_nodes_are_ignored() {
    let cluster = worker_cluster(0);
    let controller = controller(&cluster, fast_config());

    // Not yet reporting a configuration.
    let fresh = NodeBuilder::new("fresh").role("worker").build();
    let mut touched = fresh.clone();
    touched.metadata.labels.insert("x".into(), "y".into());
    controller.handle_event(WatchEvent::NodeUpdated {
        old: fresh,
        new: touched,
    });

    // Matches no pool.
    let stray = NodeBuilder::new("stray").at(OLD).build();
    controller.handle_event(WatchEvent::NodeAdded(stray));

    assert!(controller.queue().is_idle());
}

#[tokio::test]
async fn test_ambiguous_node_enqueues_nothing() {
    let cluster = cluster(
        vec![
            PoolBuilder::new("master").target(NEW).build(),
            PoolBuilder::new("infra").target(NEW).build(),
        ],
        vec![],
        vec![],
    );
    let controller = controller(&cluster, fast_config());

    let node = NodeBuilder::new("node-0").role("master").role("infra").at(OLD).build();
    controller.handle_event(WatchEvent::NodeAdded(node));
    assert!(controller.queue().is_idle());
}

#[tokio::test]
async fn test_failures_back_off_then_drop_with_cooldown() {
    // No configuration exists for the target, so every pass fails.
    let cluster = cluster(
        vec![PoolBuilder::new("worker").target(NEW).build()],
        vec![NodeBuilder::new("worker-0").role("worker").at(OLD).build()],
        vec![],
    );
    let controller = controller(
        &cluster,
        ControllerConfig {
            max_retries: 2,
            drop_cooldown: Duration::from_secs(3600),
            ..fast_config()
        },
    );
    let key = "worker".to_string();

    controller.enqueue("worker");
    assert!(controller.process_next_work_item().await);
    assert_eq!(controller.queue().num_requeues(&key), 1);

    assert!(controller.process_next_work_item().await);
    assert_eq!(controller.queue().num_requeues(&key), 2);

    // Retries exhausted: tracking is cleared and the key waits out the cooldown.
    assert!(controller.process_next_work_item().await);
    assert_eq!(controller.queue().num_requeues(&key), 0);
    assert_eq!(controller.queue().len(), 0);
    assert!(!controller.queue().is_idle());

    // Succeeding after the configuration appears clears the failure count.
    cluster.insert_configuration(ConfigurationBuilder::new(NEW).build());
    controller.enqueue("worker");
    assert!(controller.process_next_work_item().await);
    assert_eq!(controller.queue().num_requeues(&key), 0);
    assert_eq!(cluster.node("worker-0").unwrap().desired_configuration(), NEW);
}

#[tokio::test]
async fn test_worker_exits_after_shutdown() {
    let cluster = worker_cluster(0);
    let controller = controller(&cluster, fast_config());

    controller.queue().shut_down();
    assert!(!controller.process_next_work_item().await);
}

/// Plays the node agent: applies every new desired configuration at once.
fn spawn_agent(cluster: Arc<InMemoryCluster>) -> tokio::task::JoinHandle<()> {
    let mut events = cluster.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let WatchEvent::NodeUpdated { new, .. } = event else {
                continue;
            };
            let desired = new.desired_configuration().to_string();
            if desired.is_empty() || desired == new.current_configuration() {
                continue;
            }
            let mut applied = new.clone();
            for (key, value) in [
                (nodepool_api::annotations::CURRENT_CONFIGURATION, desired.as_str()),
                (nodepool_api::annotations::UPDATE_STATE, update_state::DONE),
            ] {
                applied
                    .metadata
                    .annotations
                    .insert(key.to_string(), value.to_string());
            }
            cluster.upsert_node(applied);
        }
    })
}

#[tokio::test]
async fn test_rollout_completes_one_node_at_a_time() {
    let cluster = worker_cluster(3);
    let controller = controller(&cluster, fast_config());
    let agent = spawn_agent(cluster.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn({
        let controller = Arc::clone(&controller);
        let events = cluster.watch();
        async move { controller.run(events, shutdown_rx).await }
    });

    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let done = cluster
                .pool("worker")
                .and_then(|p| p.status.condition(PoolConditionType::Updated).cloned())
                .is_some_and(|c| c.status == ConditionStatus::True);
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(finished.is_ok(), "rollout did not finish");

    let _ = shutdown_tx.send(true);
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("controller did not stop")
        .unwrap();
    agent.abort();

    for node in cluster.snapshot().nodes {
        assert_eq!(node.current_configuration(), NEW, "{}", node.name());
    }

    // Budget 1: no status ever showed more than one node unavailable.
    for (_, status) in cluster.status_updates() {
        assert!(status.unavailable_machine_count <= 1);
    }
    // Three desired-configuration patches, one per node.
    assert_eq!(cluster.patch_count(), 3);
}

#[tokio::test]
async fn test_run_stops_on_shutdown_without_events() {
    let cluster = worker_cluster(0);
    let controller = controller(&cluster, fast_config());
    let (_events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let run = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.run(events_rx, shutdown_rx).await }
    });
    tokio::task::yield_now().await;

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("controller did not stop")
        .unwrap();
    assert!(controller.queue().is_shutting_down());
}
