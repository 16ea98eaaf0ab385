//! Turning watch events into queued pool keys.

use nodepool_api::{Node, WatchEvent};
use tracing::{debug, error, info};

use super::resolver::resolve_pool;
use super::Controller;
use crate::node_state::{check_node_ready, is_node_done, is_node_managed};

impl Controller {
    /// React to one watch event.
    pub fn handle_event(&self, event: WatchEvent) {
        match event {
            WatchEvent::PoolAdded(pool) => {
                debug!(pool = %pool.name, "Pool added");
                self.enqueue_after(&pool.name, self.config.settle_delay);
            }
            WatchEvent::PoolUpdated { new, .. } => {
                debug!(pool = %new.name, "Pool updated");
                self.enqueue_after(&new.name, self.config.settle_delay);
            }
            WatchEvent::PoolDeleted(pool) => {
                info!(pool = %pool.name, "Pool deleted");
            }
            WatchEvent::NodeAdded(node) if node.is_deleting() => self.node_deleted(&node),
            WatchEvent::NodeAdded(node) => {
                if let Some(pool) = self.owning_pool(&node) {
                    debug!(node = %node.name(), pool = %pool, "Node added");
                    self.enqueue(&pool);
                }
            }
            WatchEvent::NodeUpdated { old, new } => self.node_updated(&old, &new),
            WatchEvent::NodeDeleted(node) => self.node_deleted(&node),
        }
    }

    fn node_updated(&self, old: &Node, new: &Node) {
        if !is_node_managed(new) {
            return;
        }
        let Some(pool) = self.owning_pool(new) else {
            return;
        };
        if node_update_needs_sync(old, new) {
            debug!(node = %new.name(), pool = %pool, "Node changed");
            self.enqueue(&pool);
        }
    }

    fn node_deleted(&self, node: &Node) {
        if let Some(pool) = self.owning_pool(node) {
            debug!(node = %node.name(), pool = %pool, "Node deleted");
            self.enqueue(&pool);
        }
    }

    /// Name of the pool that owns `node`, logging when it cannot be told.
    fn owning_pool(&self, node: &Node) -> Option<String> {
        let pools = match self.cache.list_pools() {
            Ok(pools) => pools,
            Err(e) => {
                error!(node = %node.name(), error = %e, "Unable to list pools");
                return None;
            }
        };
        match resolve_pool(node, &pools) {
            Ok(pool) => pool.map(|p| p.name.clone()),
            Err(e) => {
                error!(node = %node.name(), error = %e, "Unable to resolve pool for node");
                None
            }
        }
    }
}

/// True if the change from `old` to `new` affects a rollout decision.
///
/// Only readiness, update completion and the configuration annotations are
/// tracked; label or taint edits alone do not count.
pub fn node_update_needs_sync(old: &Node, new: &Node) -> bool {
    check_node_ready(old) != check_node_ready(new)
        || (!is_node_done(old) && is_node_done(new))
        || old.current_configuration() != new.current_configuration()
        || old.desired_configuration() != new.desired_configuration()
        || old.update_state() != new.update_state()
}

#[cfg(test)]
mod tests {
    use nodepool_api::{annotations, ConditionStatus, NodeCondition};

    use super::*;

    fn node() -> Node {
        let mut node = Node::new("n1");
        node.metadata
            .annotations
            .insert(annotations::CURRENT_CONFIGURATION.into(), "c1".into());
        node.metadata
            .annotations
            .insert(annotations::DESIRED_CONFIGURATION.into(), "c1".into());
        node.metadata
            .annotations
            .insert(annotations::UPDATE_STATE.into(), "Done".into());
        node.status
            .conditions
            .push(NodeCondition::new("Ready", ConditionStatus::True));
        node
    }

    #[test]
    fn test_unrelated_edits_are_ignored() {
        let old = node();
        let mut new = old.clone();
        new.metadata.labels.insert("team".into(), "storage".into());
        new.metadata.resource_version = Some("42".into());
        assert!(!node_update_needs_sync(&old, &new));
    }

    #[test]
    fn test_readiness_transition_triggers() {
        let old = node();
        let mut new = old.clone();
        new.status.conditions[0].status = ConditionStatus::False;
        assert!(node_update_needs_sync(&old, &new));
    }

    #[test]
    fn test_annotation_changes_trigger() {
        let old = node();
        for key in [
            annotations::CURRENT_CONFIGURATION,
            annotations::DESIRED_CONFIGURATION,
            annotations::UPDATE_STATE,
        ] {
            let mut new = old.clone();
            new.metadata.annotations.insert(key.into(), "changed".into());
            assert!(node_update_needs_sync(&old, &new), "{key}");
        }
    }
}
