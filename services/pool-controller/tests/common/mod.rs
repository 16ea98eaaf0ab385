#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use nodepool_api::{Configuration, Node, Pool};
use nodepool_controller::{Controller, ControllerConfig, InMemoryCluster};
use nodepool_reconcile::Backoff;

pub const OLD: &str = "rendered-worker-1";
pub const NEW: &str = "rendered-worker-2";

/// Short delays so tests do not wait on production timings.
pub fn fast_config() -> ControllerConfig {
    ControllerConfig {
        workers: 2,
        settle_delay: Duration::from_millis(10),
        node_update_backoff: fast_backoff(),
        queue_base_delay: Duration::from_millis(1),
        queue_max_delay: Duration::from_millis(50),
        ..ControllerConfig::default()
    }
}

pub fn fast_backoff() -> Backoff {
    Backoff {
        steps: 3,
        duration: Duration::from_millis(1),
        factor: 1.0,
        jitter: 0.0,
        cap: Duration::from_millis(1),
    }
}

pub fn cluster(
    pools: Vec<Pool>,
    nodes: Vec<Node>,
    configurations: Vec<Configuration>,
) -> Arc<InMemoryCluster> {
    let cluster = InMemoryCluster::new();
    for configuration in configurations {
        cluster.insert_configuration(configuration);
    }
    for pool in pools {
        cluster.upsert_pool(pool);
    }
    for node in nodes {
        cluster.upsert_node(node);
    }
    Arc::new(cluster)
}

pub fn controller(cluster: &Arc<InMemoryCluster>, config: ControllerConfig) -> Arc<Controller> {
    Arc::new(Controller::new(cluster.clone(), cluster.clone(), config))
}

/// Names of nodes whose desired configuration is `configuration`.
pub fn targeting(cluster: &InMemoryCluster, configuration: &str) -> Vec<String> {
    cluster
        .snapshot()
        .nodes
        .into_iter()
        .filter(|n| n.desired_configuration() == configuration)
        .map(|n| n.metadata.name)
        .collect()
}
