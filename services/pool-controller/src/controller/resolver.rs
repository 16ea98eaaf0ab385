//! Pool membership resolution.
//!
//! A node is matched by every pool whose selector selects it, but owned by
//! at most one. Built-in roles are disambiguated as follows:
//!
//! ```text
//! matches                       owner
//! ----------------------------  ---------------------------
//! 2+ custom                     error
//! 1 custom + master             error
//! 1 custom (+ worker)           custom
//! master (+ worker)             master
//! worker                        worker
//! nothing                       none (unmanaged)
//! ```

use nodepool_api::{LabelSelector, Node, Pool, MASTER_POOL, WORKER_POOL};
use tracing::warn;

use crate::error::ResolveError;

/// Find the pool that owns `node`.
///
/// Pools with a missing or match-everything selector never claim a node.
pub fn resolve_pool<'a>(node: &Node, pools: &'a [Pool]) -> Result<Option<&'a Pool>, ResolveError> {
    let mut master = None;
    let mut worker = None;
    let mut custom = Vec::new();

    for pool in pools {
        let selector = LabelSelector::compile(pool.spec.node_selector.as_ref()).map_err(|source| {
            ResolveError::InvalidSelector {
                pool: pool.name.clone(),
                source,
            }
        })?;
        if selector.is_empty() || !selector.matches(node.labels()) {
            continue;
        }

        match pool.name.as_str() {
            MASTER_POOL => master = Some(pool),
            WORKER_POOL => worker = Some(pool),
            _ => custom.push(pool),
        }
    }

    match (custom.as_slice(), master) {
        ([_, _, ..], _) => Err(ResolveError::MultipleCustomPools {
            node: node.name().to_string(),
            pools: custom.iter().map(|p| p.name.clone()).collect(),
        }),
        ([only], Some(_)) => Err(ResolveError::MasterWithCustom {
            node: node.name().to_string(),
            custom: only.name.clone(),
        }),
        ([only], None) => Ok(Some(*only)),
        ([], Some(master)) => Ok(Some(master)),
        ([], None) => Ok(worker),
    }
}

/// Nodes matched by `pool`'s selector that `pool` actually owns.
///
/// `candidates` should be the nodes the pool's selector lists. Any node that
/// cannot be resolved fails the whole listing.
pub fn members_of(
    pool: &Pool,
    candidates: Vec<Node>,
    pools: &[Pool],
) -> Result<Vec<Node>, ResolveError> {
    let mut members = Vec::with_capacity(candidates.len());
    for node in candidates {
        if owned_by(pool, &node, pools)? {
            members.push(node);
        }
    }
    Ok(members)
}

/// Like [`members_of`], but skips nodes with an ambiguous assignment.
///
/// Used where a partial answer is better than none, such as status reporting.
pub fn members_of_lenient(
    pool: &Pool,
    candidates: Vec<Node>,
    pools: &[Pool],
) -> Result<Vec<Node>, ResolveError> {
    let mut members = Vec::with_capacity(candidates.len());
    for node in candidates {
        match owned_by(pool, &node, pools) {
            Ok(true) => members.push(node),
            Ok(false) => {}
            Err(e) if e.is_ambiguous() => {
                warn!(pool = %pool.name, node = %node.name(), error = %e, "Skipping unresolvable node");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(members)
}

fn owned_by(pool: &Pool, node: &Node, pools: &[Pool]) -> Result<bool, ResolveError> {
    Ok(resolve_pool(node, pools)?.is_some_and(|owner| owner.name == pool.name))
}
