//! Pool status summarization.

use chrono::{DateTime, Utc};
use nodepool_api::{ConditionStatus, Node, Pool, PoolCondition, PoolConditionType, PoolStatus};

use crate::node_state::{is_node_failing, is_node_ready, is_node_unavailable, is_node_updated};

/// Summarize `members` into a new status for `pool`.
///
/// Condition transition times carry over from the current status when a
/// condition keeps its value, so an unchanged pool produces an equal status.
pub fn calculate_status(pool: &Pool, members: &[Node], now: DateTime<Utc>) -> PoolStatus {
    let target = pool.target();

    let machine_count = members.len();
    let updated: Vec<&Node> = members
        .iter()
        .filter(|n| !target.is_empty() && is_node_updated(n, target))
        .collect();
    let updated_machine_count = updated.len();
    let ready_machine_count = updated.iter().filter(|n| is_node_ready(n)).count();
    let unavailable_machine_count = members.iter().filter(|n| is_node_unavailable(n)).count();
    let degraded_machine_count = members.iter().filter(|n| is_node_failing(n)).count();

    let all_updated = !target.is_empty()
        && updated_machine_count == machine_count
        && ready_machine_count == machine_count
        && unavailable_machine_count == 0;

    let mut status = PoolStatus {
        configuration: pool.status.configuration.clone(),
        machine_count,
        updated_machine_count,
        ready_machine_count,
        unavailable_machine_count,
        degraded_machine_count,
        conditions: pool.status.conditions.clone(),
    };

    if all_updated {
        status.configuration = pool.spec.configuration.clone();
        set_condition(
            &mut status.conditions,
            PoolConditionType::Updated,
            ConditionStatus::True,
            "AllNodesUpdated",
            format!("All nodes are updated with {target}"),
            now,
        );
        set_condition(
            &mut status.conditions,
            PoolConditionType::Updating,
            ConditionStatus::False,
            "",
            String::new(),
            now,
        );
    } else {
        set_condition(
            &mut status.conditions,
            PoolConditionType::Updated,
            ConditionStatus::False,
            "",
            String::new(),
            now,
        );
        let (updating, reason, message) = if pool.spec.paused {
            (ConditionStatus::False, "Paused", "Pool is paused".to_string())
        } else if target.is_empty() {
            (
                ConditionStatus::False,
                "Unconfigured",
                "Pool has no target configuration".to_string(),
            )
        } else {
            (
                ConditionStatus::True,
                "RollingOut",
                format!("Nodes are moving to {target}"),
            )
        };
        set_condition(
            &mut status.conditions,
            PoolConditionType::Updating,
            updating,
            reason,
            message,
            now,
        );
    }

    let (degraded, reason, message) = if degraded_machine_count > 0 {
        (
            ConditionStatus::True,
            "NodesDegraded",
            format!("{degraded_machine_count} nodes are reporting degraded status"),
        )
    } else {
        (ConditionStatus::False, "", String::new())
    };
    set_condition(
        &mut status.conditions,
        PoolConditionType::Degraded,
        degraded,
        reason,
        message,
        now,
    );

    status
}

fn set_condition(
    conditions: &mut Vec<PoolCondition>,
    type_: PoolConditionType,
    status: ConditionStatus,
    reason: &str,
    message: String,
    now: DateTime<Utc>,
) {
    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            if existing.status != status {
                existing.status = status;
                existing.last_transition_time = now;
            }
            existing.reason = reason.to_string();
            existing.message = message;
        }
        None => conditions.push(PoolCondition {
            type_,
            status,
            last_transition_time: now,
            reason: reason.to_string(),
            message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use nodepool_api::{annotations, update_state};

    use super::*;

    fn node(current: &str, desired: &str, state: &str) -> Node {
        let mut node = Node::new("n");
        let ann = &mut node.metadata.annotations;
        ann.insert(annotations::CURRENT_CONFIGURATION.into(), current.into());
        ann.insert(annotations::DESIRED_CONFIGURATION.into(), desired.into());
        ann.insert(annotations::UPDATE_STATE.into(), state.into());
        node
    }

    fn pool(target: &str) -> Pool {
        let mut pool = Pool::new("worker");
        pool.spec.configuration.name = target.to_string();
        pool
    }

    #[test]
    fn test_fully_updated_pool() {
        let pool = pool("c2");
        let members = vec![node("c2", "c2", "Done"), node("c2", "c2", "Done")];
        let status = calculate_status(&pool, &members, Utc::now());

        assert_eq!(status.machine_count, 2);
        assert_eq!(status.updated_machine_count, 2);
        assert_eq!(status.ready_machine_count, 2);
        assert_eq!(status.configuration.name, "c2");
        let updated = status.condition(PoolConditionType::Updated).unwrap();
        assert_eq!(updated.status, ConditionStatus::True);
    }

    #[test]
    fn test_rolling_pool_keeps_previous_configuration() {
        let mut pool = pool("c2");
        pool.status.configuration.name = "c1".into();
        let members = vec![
            node("c1", "c2", update_state::WORKING),
            node("c1", "c1", update_state::DONE),
            node("c1", "c2", update_state::DEGRADED),
        ];
        let status = calculate_status(&pool, &members, Utc::now());

        assert_eq!(status.configuration.name, "c1");
        assert_eq!(status.updated_machine_count, 0);
        // The degraded member is counted as degraded, not unavailable.
        assert_eq!(status.unavailable_machine_count, 1);
        assert_eq!(status.degraded_machine_count, 1);
        assert_eq!(
            status.condition(PoolConditionType::Updating).unwrap().status,
            ConditionStatus::True
        );
        assert_eq!(
            status.condition(PoolConditionType::Degraded).unwrap().status,
            ConditionStatus::True
        );
    }

    #[test]
    fn test_paused_pool_is_not_updating() {
        let mut pool = pool("c2");
        pool.spec.paused = true;
        let status = calculate_status(&pool, &[node("c1", "c1", "Done")], Utc::now());
        let updating = status.condition(PoolConditionType::Updating).unwrap();
        assert_eq!(updating.status, ConditionStatus::False);
        assert_eq!(updating.reason, "Paused");
    }

    #[test]
    fn test_recalculation_is_stable() {
        let t0 = Utc::now();
        let mut pool = pool("c2");
        let members = vec![node("c1", "c1", "Done")];

        pool.status = calculate_status(&pool, &members, t0);
        let again = calculate_status(&pool, &members, t0 + Duration::minutes(5));
        assert_eq!(again, pool.status);
    }
}
