//! Node pool controller.
//!
//! Assigns cluster nodes to configuration pools and rolls each pool's target
//! configuration out to its members, a bounded number at a time.
//!
//! ## Architecture
//!
//! - **Triggers**: turn pool and node watch events into queued pool keys
//! - **Resolver**: decides which single pool owns a node
//! - **Capacity**: computes how many members may be unavailable at once
//! - **Candidates**: picks the members allowed to start updating
//! - **Mutator**: converges labels and taints and sets the desired
//!   configuration through conflict-retried merge patches
//! - **Status**: summarizes member progress into the pool status
//!
//! The cluster is reached only through [`client::ClusterCache`] and
//! [`client::ClusterApi`]; [`memory::InMemoryCluster`] implements both.

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod memory;
pub mod node_state;

pub use client::{ClientError, ClusterApi, ClusterCache, EventRecord, EventType};
pub use controller::{Controller, ControllerConfig, SyncOutcome};
pub use error::{ControllerError, ControllerResult, ResolveError};
pub use memory::{InMemoryCluster, Snapshot};
