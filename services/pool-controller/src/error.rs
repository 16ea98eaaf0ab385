//! Controller error types.

use nodepool_api::{BudgetError, SelectorError};
use nodepool_reconcile::Conflict;
use thiserror::Error;

use crate::client::ClientError;

/// Result type for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// A node that cannot be placed in exactly one pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Some pool's selector does not compile.
    #[error("invalid label selector on pool {pool}: {source}")]
    InvalidSelector {
        pool: String,
        #[source]
        source: SelectorError,
    },

    #[error(
        "node {node} belongs to {} custom pools ({}), cannot proceed with this node",
        .pools.len(),
        .pools.join(", ")
    )]
    MultipleCustomPools { node: String, pools: Vec<String> },

    /// Custom pools are not supported for masters.
    #[error("node {node} has both master role and custom role {custom}")]
    MasterWithCustom { node: String, custom: String },
}

impl ResolveError {
    /// True for the two ambiguous-assignment cases.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            Self::MultipleCustomPools { .. } | Self::MasterWithCustom { .. }
        )
    }
}

/// Errors that fail a reconciliation pass. Every variant is retried at the
/// queue level.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("invalid node selector on pool {pool}: {source}")]
    InvalidSelector {
        pool: String,
        #[source]
        source: SelectorError,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("invalid maxUnavailable on pool {pool}: {source}")]
    InvalidBudget {
        pool: String,
        #[source]
        source: BudgetError,
    },

    #[error("gave up patching node {node} after repeated conflicts")]
    ConflictExhausted {
        node: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to patch node {node}: {source}")]
    MutationFailed {
        node: String,
        #[source]
        source: ClientError,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A reconciliation task ended abnormally.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Conflict for ControllerError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_conflict())
    }
}
