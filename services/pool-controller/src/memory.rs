//! In-memory cluster used by tests and dry runs.
//!
//! Implements both client seams over one store, assigns resource versions
//! on every write and enforces them on patches, and publishes the watch
//! events a real cache would deliver.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use nodepool_api::{Configuration, Node, Pool, PoolStatus, Selector, WatchEvent};
use nodepool_reconcile::apply_merge_patch;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::client::{ClientError, ClusterApi, ClusterCache, EventRecord};

/// Serialized cluster contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub configurations: Vec<Configuration>,
}

/// A patch accepted by [`InMemoryCluster::patch_node`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPatch {
    pub node: String,
    pub patch: Value,
}

#[derive(Default)]
struct Store {
    pools: BTreeMap<String, Pool>,
    nodes: BTreeMap<String, Node>,
    configurations: BTreeMap<String, Configuration>,
    version: u64,

    /// Pending forced conflicts: node -> patches still to reject.
    conflicts: HashMap<String, u32>,
    patches: Vec<RecordedPatch>,
    events: Vec<EventRecord>,
    status_updates: Vec<(String, PoolStatus)>,
}

impl Store {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// A single-process stand-in for the cluster.
#[derive(Default)]
pub struct InMemoryCluster {
    store: RwLock<Store>,
    watchers: Mutex<Vec<mpsc::UnboundedSender<WatchEvent>>>,

    /// Bumped on every published change and recorded event.
    generation: AtomicU64,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let cluster = Self::new();
        for configuration in snapshot.configurations {
            cluster.insert_configuration(configuration);
        }
        for pool in snapshot.pools {
            cluster.upsert_pool(pool);
        }
        for node in snapshot.nodes {
            cluster.upsert_node(node);
        }
        cluster
    }

    pub fn snapshot(&self) -> Snapshot {
        let store = self.store.read();
        Snapshot {
            pools: store.pools.values().cloned().collect(),
            nodes: store.nodes.values().cloned().collect(),
            configurations: store.configurations.values().cloned().collect(),
        }
    }

    /// Receive every change made from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<WatchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().push(tx);
        rx
    }

    /// Like [`subscribe`](Self::subscribe), but first replays an add event
    /// for everything currently stored.
    pub fn watch(&self) -> mpsc::UnboundedReceiver<WatchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watchers = self.watchers.lock();
        for event in self.initial_events() {
            let _ = tx.send(event);
        }
        watchers.push(tx);
        rx
    }

    /// Add events for everything currently stored, pools first.
    pub fn initial_events(&self) -> Vec<WatchEvent> {
        let store = self.store.read();
        store
            .pools
            .values()
            .cloned()
            .map(WatchEvent::PoolAdded)
            .chain(store.nodes.values().cloned().map(WatchEvent::NodeAdded))
            .collect()
    }

    pub fn insert_configuration(&self, configuration: Configuration) {
        self.store
            .write()
            .configurations
            .insert(configuration.name.clone(), configuration);
    }

    pub fn upsert_pool(&self, pool: Pool) {
        let old = self.store.write().pools.insert(pool.name.clone(), pool.clone());
        self.publish(match old {
            Some(old) => WatchEvent::PoolUpdated { old, new: pool },
            None => WatchEvent::PoolAdded(pool),
        });
    }

    pub fn delete_pool(&self, name: &str) {
        let removed = self.store.write().pools.remove(name);
        if let Some(pool) = removed {
            self.publish(WatchEvent::PoolDeleted(pool));
        }
    }

    /// Store `node` with a fresh resource version.
    pub fn upsert_node(&self, mut node: Node) -> Node {
        let old = {
            let mut store = self.store.write();
            node.metadata.resource_version = Some(store.next_version());
            store.nodes.insert(node.name().to_string(), node.clone())
        };
        self.publish(match old {
            Some(old) => WatchEvent::NodeUpdated {
                old,
                new: node.clone(),
            },
            None => WatchEvent::NodeAdded(node.clone()),
        });
        node
    }

    pub fn delete_node(&self, name: &str) {
        let removed = self.store.write().nodes.remove(name);
        if let Some(node) = removed {
            self.publish(WatchEvent::NodeDeleted(node));
        }
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.store.read().nodes.get(name).cloned()
    }

    pub fn pool(&self, name: &str) -> Option<Pool> {
        self.store.read().pools.get(name).cloned()
    }

    /// Make the next `count` patches to `node` fail with a conflict.
    pub fn inject_conflicts(&self, node: &str, count: u32) {
        self.store.write().conflicts.insert(node.to_string(), count);
    }

    /// Number of patches accepted so far.
    pub fn patch_count(&self) -> usize {
        self.store.read().patches.len()
    }

    pub fn patches(&self) -> Vec<RecordedPatch> {
        self.store.read().patches.clone()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.store.read().events.clone()
    }

    pub fn status_updates(&self) -> Vec<(String, PoolStatus)> {
        self.store.read().status_updates.clone()
    }

    /// Number of changes made to the cluster so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn publish(&self, event: WatchEvent) {
        debug!(kind = event.kind(), "Publishing watch event");
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.watchers.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl ClusterCache for InMemoryCluster {
    fn list_pools(&self) -> Result<Vec<Pool>, ClientError> {
        Ok(self.store.read().pools.values().cloned().collect())
    }

    fn get_pool(&self, name: &str) -> Result<Pool, ClientError> {
        self.pool(name).ok_or_else(|| ClientError::NotFound {
            kind: "pool",
            name: name.to_string(),
        })
    }

    fn list_nodes(&self, selector: &Selector) -> Result<Vec<Node>, ClientError> {
        Ok(self
            .store
            .read()
            .nodes
            .values()
            .filter(|n| selector.matches(n.labels()))
            .cloned()
            .collect())
    }

    fn get_configuration(&self, name: &str) -> Result<Configuration, ClientError> {
        self.store
            .read()
            .configurations
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                kind: "configuration",
                name: name.to_string(),
            })
    }
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    async fn get_node(&self, name: &str) -> Result<Node, ClientError> {
        self.node(name).ok_or_else(|| ClientError::NotFound {
            kind: "node",
            name: name.to_string(),
        })
    }

    async fn patch_node(&self, name: &str, patch: &Value) -> Result<Node, ClientError> {
        let (old, new) = {
            let mut store = self.store.write();
            let Some(old) = store.nodes.get(name).cloned() else {
                return Err(ClientError::NotFound {
                    kind: "node",
                    name: name.to_string(),
                });
            };

            if let Some(remaining) = store.conflicts.get_mut(name).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(conflict(name, "injected conflict"));
            }

            let precondition = patch
                .get("metadata")
                .and_then(|m| m.get("resourceVersion"))
                .and_then(Value::as_str);
            if let Some(expected) = precondition {
                if old.metadata.resource_version.as_deref() != Some(expected) {
                    return Err(conflict(
                        name,
                        "the object has been modified; please apply your changes to the latest version",
                    ));
                }
            }

            let mut doc = serde_json::to_value(&old).map_err(|e| ClientError::Other(e.to_string()))?;
            apply_merge_patch(&mut doc, patch);
            let mut new: Node =
                serde_json::from_value(doc).map_err(|e| ClientError::Other(e.to_string()))?;
            new.metadata.name = old.metadata.name.clone();
            new.metadata.resource_version = Some(store.next_version());

            store.nodes.insert(name.to_string(), new.clone());
            store.patches.push(RecordedPatch {
                node: name.to_string(),
                patch: patch.clone(),
            });
            (old, new)
        };

        self.publish(WatchEvent::NodeUpdated {
            old,
            new: new.clone(),
        });
        Ok(new)
    }

    async fn update_pool_status(&self, name: &str, status: &PoolStatus) -> Result<(), ClientError> {
        let (old, new) = {
            let mut store = self.store.write();
            let Some(pool) = store.pools.get_mut(name) else {
                return Err(ClientError::NotFound {
                    kind: "pool",
                    name: name.to_string(),
                });
            };
            let old = pool.clone();
            pool.status = status.clone();
            let new = pool.clone();
            store
                .status_updates
                .push((name.to_string(), status.clone()));
            (old, new)
        };

        self.publish(WatchEvent::PoolUpdated { old, new });
        Ok(())
    }

    async fn record_event(&self, event: EventRecord) {
        debug!(pool = %event.pool, reason = %event.reason, "Recording event");
        self.store.write().events.push(event);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

fn conflict(name: &str, message: &str) -> ClientError {
    ClientError::Conflict {
        kind: "node",
        name: name.to_string(),
        message: message.to_string(),
    }
}
