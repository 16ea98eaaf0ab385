//! Node objects and the annotation contract with the node agent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Annotation keys shared with the node-resident agent.
///
/// The controller writes only the desired configuration. The agent writes
/// the current configuration and the update state.
pub mod annotations {
    /// Configuration the node is currently running.
    pub const CURRENT_CONFIGURATION: &str = "nodepool.io/current-configuration";

    /// Configuration the node has been asked to move to.
    pub const DESIRED_CONFIGURATION: &str = "nodepool.io/desired-configuration";

    /// Free-form progress signal written by the agent.
    pub const UPDATE_STATE: &str = "nodepool.io/state";
}

/// Values the agent writes to [`annotations::UPDATE_STATE`].
pub mod update_state {
    pub const DONE: &str = "Done";
    pub const WORKING: &str = "Working";
    pub const DEGRADED: &str = "Degraded";
    pub const UNRECONCILABLE: &str = "Unreconcilable";
}

/// A cluster node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub metadata: NodeMeta,

    #[serde(default)]
    pub spec: NodeSpec,

    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    pub name: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Opaque version used for optimistic concurrency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub taints: Vec<Taint>,

    #[serde(default)]
    pub unschedulable: bool,
}

/// A node taint. At most one taint per key is managed by a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,

    pub effect: TaintEffect,
}

impl Taint {
    pub fn new(key: impl Into<String>, value: impl Into<String>, effect: TaintEffect) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            effect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

/// A node condition such as `Ready` or `DiskPressure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NodeCondition {
    pub fn new(type_: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: NodeMeta {
                name: name.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.metadata.labels
    }

    /// Annotation value; a missing annotation reads as the empty string.
    pub fn annotation(&self, key: &str) -> &str {
        self.metadata
            .annotations
            .get(key)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn current_configuration(&self) -> &str {
        self.annotation(annotations::CURRENT_CONFIGURATION)
    }

    pub fn desired_configuration(&self) -> &str {
        self.annotation(annotations::DESIRED_CONFIGURATION)
    }

    pub fn update_state(&self) -> &str {
        self.annotation(annotations::UPDATE_STATE)
    }

    pub fn condition(&self, type_: &str) -> Option<&NodeCondition> {
        self.status.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
