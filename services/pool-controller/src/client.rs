//! Seams to the cluster.
//!
//! Reads go through [`ClusterCache`], a synchronous view over watch-fed
//! snapshots. Writes and live reads go through [`ClusterApi`].
//!
//! Every value returned is an owned copy; callers may mutate it freely
//! without touching the cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodepool_api::{Configuration, Node, Pool, PoolStatus, Selector};
use nodepool_reconcile::Conflict;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the cluster seams.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    /// The object changed since it was read (optimistic concurrency).
    #[error("conflict writing {kind} {name:?}: {message}")]
    Conflict {
        kind: &'static str,
        name: String,
        message: String,
    },

    #[error("cluster request failed: {0}")]
    Other(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl Conflict for ClientError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Snapshot reads from the watch cache.
pub trait ClusterCache: Send + Sync {
    /// True once the initial list of every watched kind has been observed.
    fn has_synced(&self) -> bool {
        true
    }

    fn list_pools(&self) -> Result<Vec<Pool>, ClientError>;

    fn get_pool(&self, name: &str) -> Result<Pool, ClientError>;

    /// Nodes matching `selector`, in a stable order.
    fn list_nodes(&self, selector: &Selector) -> Result<Vec<Node>, ClientError>;

    fn get_configuration(&self, name: &str) -> Result<Configuration, ClientError>;
}

/// Writes and live reads against the cluster.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch the latest version of a node, bypassing the cache.
    async fn get_node(&self, name: &str) -> Result<Node, ClientError>;

    /// Apply a JSON merge patch to a node. A patch carrying
    /// `metadata.resourceVersion` fails with [`ClientError::Conflict`] if the
    /// node has moved on.
    async fn patch_node(&self, name: &str, patch: &serde_json::Value)
        -> Result<Node, ClientError>;

    async fn update_pool_status(&self, name: &str, status: &PoolStatus)
        -> Result<(), ClientError>;

    /// Record an event against a pool. Best effort.
    async fn record_event(&self, event: EventRecord);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

/// An event attached to a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub pool: String,
    #[serde(rename = "type")]
    pub type_: EventType,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(
        pool: impl Into<String>,
        type_: EventType,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            pool: pool.into(),
            type_,
            reason: reason.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn normal(
        pool: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(pool, EventType::Normal, reason, message)
    }

    pub fn warning(
        pool: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(pool, EventType::Warning, reason, message)
    }
}
