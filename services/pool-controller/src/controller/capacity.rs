//! Disruption budget for a pool.

use nodepool_api::{BudgetError, Pool};
use tracing::warn;

/// Budget used when a pool does not configure one.
const DEFAULT_MAX_UNAVAILABLE: usize = 1;

/// How many members of a majority-quorum pool of `n` may be down while a
/// majority stays up.
pub fn quorum_tolerance(n: usize) -> usize {
    n.saturating_sub(n / 2 + 1)
}

/// Maximum number of `pool`'s members that may be unavailable at once.
///
/// A configured budget that resolves to zero is raised to one. For the
/// master pool the result is then clamped to the quorum tolerance, which
/// may bring it back down to zero for pools of one or two members.
pub fn max_unavailable(pool: &Pool, member_count: usize) -> Result<usize, BudgetError> {
    let mut budget = match &pool.spec.max_unavailable {
        Some(value) => value.resolve(member_count)?,
        None => DEFAULT_MAX_UNAVAILABLE,
    };
    if budget == 0 {
        budget = DEFAULT_MAX_UNAVAILABLE;
    }

    if pool.is_master() {
        let tolerance = quorum_tolerance(member_count);
        if budget > tolerance {
            warn!(
                pool = %pool.name,
                configured = budget,
                tolerance,
                members = member_count,
                "Configured maxUnavailable exceeds quorum tolerance, clamping"
            );
            budget = tolerance;
        }
    }

    Ok(budget)
}
