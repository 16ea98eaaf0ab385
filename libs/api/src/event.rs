//! Watch notifications delivered by the cache layer.

use crate::node::Node;
use crate::pool::Pool;

/// A change observed on a pool or a node. Updates carry both snapshots.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    PoolAdded(Pool),
    PoolUpdated { old: Pool, new: Pool },
    PoolDeleted(Pool),
    NodeAdded(Node),
    NodeUpdated { old: Node, new: Node },
    /// Last-known snapshot of a node that is gone from the cache.
    NodeDeleted(Node),
}

impl WatchEvent {
    /// Short kind label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PoolAdded(_) => "pool_added",
            Self::PoolUpdated { .. } => "pool_updated",
            Self::PoolDeleted(_) => "pool_deleted",
            Self::NodeAdded(_) => "node_added",
            Self::NodeUpdated { .. } => "node_updated",
            Self::NodeDeleted(_) => "node_deleted",
        }
    }
}
