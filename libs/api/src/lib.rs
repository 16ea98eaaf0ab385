//! # nodepool-api
//!
//! Object model shared by the nodepool controller and its tests.
//!
//! ## Objects
//!
//! - [`Pool`]: a named group of nodes with a node selector, a target
//!   configuration and a disruption budget
//! - [`Node`]: a cluster node; labels, taints and three annotations form the
//!   contract with the node-resident agent
//! - [`Configuration`]: a rendered configuration whose label and taint
//!   directives are converged onto the nodes of a pool
//!
//! ## Ownership
//!
//! Pools and nodes are owned by the cluster. The controller reads them as
//! point-in-time snapshots and writes nodes only through merge patches.

mod budget;
mod configuration;
mod error;
mod event;
mod node;
mod pool;
mod selector;

pub use budget::IntOrPercent;
pub use configuration::{Configuration, ConfigurationSpec, LabelDirective, TaintDirective};
pub use error::{BudgetError, SelectorError};
pub use event::WatchEvent;
pub use node::{
    annotations, update_state, ConditionStatus, Node, NodeCondition, NodeMeta, NodeSpec,
    NodeStatus, Taint, TaintEffect,
};
pub use pool::{
    ConfigurationRef, Pool, PoolCondition, PoolConditionType, PoolSpec, PoolStatus,
    MASTER_POOL, WORKER_POOL,
};
pub use selector::{
    LabelSelector, LabelSelectorRequirement, Requirement, Selector, SelectorOperator,
};
