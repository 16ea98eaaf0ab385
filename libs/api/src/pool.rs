//! Pool objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::budget::IntOrPercent;
use crate::node::ConditionStatus;
use crate::selector::LabelSelector;

/// Name of the quorum-critical pool.
pub const MASTER_POOL: &str = "master";

/// Name of the default pool for nodes without a custom role.
pub const WORKER_POOL: &str = "worker";

/// A named group of nodes sharing a target configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub name: String,

    #[serde(default)]
    pub spec: PoolSpec,

    #[serde(default)]
    pub status: PoolStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    /// Nodes this pool claims. A missing selector claims nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<LabelSelector>,

    /// Target configuration; an empty name means the pool is not rendered yet.
    #[serde(default)]
    pub configuration: ConfigurationRef,

    /// Maximum nodes allowed to be unavailable at once. Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrPercent>,

    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRef {
    #[serde(default)]
    pub name: String,
}

/// Observed rollout state of a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    /// Configuration every member is running; empty while a rollout is in flight.
    #[serde(default)]
    pub configuration: ConfigurationRef,

    pub machine_count: usize,
    pub updated_machine_count: usize,
    pub ready_machine_count: usize,
    pub unavailable_machine_count: usize,
    pub degraded_machine_count: usize,

    #[serde(default)]
    pub conditions: Vec<PoolCondition>,
}

impl PoolStatus {
    pub fn condition(&self, type_: PoolConditionType) -> Option<&PoolCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolCondition {
    #[serde(rename = "type")]
    pub type_: PoolConditionType,
    pub status: ConditionStatus,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolConditionType {
    Updated,
    Updating,
    Degraded,
}

impl Pool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Name of the target configuration, empty when unset.
    pub fn target(&self) -> &str {
        &self.spec.configuration.name
    }

    pub fn is_master(&self) -> bool {
        self.name == MASTER_POOL
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}
