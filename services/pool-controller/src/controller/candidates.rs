//! Choosing which members may start updating.

use nodepool_api::{Node, Pool};

use crate::node_state::{is_node_failing, is_node_unavailable};

/// Members of `pool` that may be told to move to its target now.
///
/// Unavailable members use up the budget first. Members already targeting
/// the pool's configuration but failing to apply it hold a slot too. The
/// remainder goes to members not yet targeting the configuration, in the
/// order given.
pub fn select_candidates<'a>(pool: &Pool, members: &'a [Node], budget: usize) -> Vec<&'a Node> {
    let target = pool.target();

    let unavailable = members.iter().filter(|n| is_node_unavailable(n)).count();
    if unavailable >= budget {
        return Vec::new();
    }
    let mut capacity = budget - unavailable;

    let failing = members
        .iter()
        .filter(|n| n.desired_configuration() == target && is_node_failing(n))
        .count();
    if failing >= capacity {
        return Vec::new();
    }
    capacity -= failing;

    members
        .iter()
        .filter(|n| n.desired_configuration() != target)
        .take(capacity)
        .collect()
}

#[cfg(test)]
mod tests {
    use nodepool_api::{annotations, update_state};
    use proptest::prelude::*;

    use super::*;

    const OLD: &str = "rendered-worker-1";
    const NEW: &str = "rendered-worker-2";

    fn worker_pool() -> Pool {
        let mut pool = Pool::new("worker");
        pool.spec.configuration.name = NEW.to_string();
        pool
    }

    fn node(name: &str, current: &str, desired: &str, state: &str) -> Node {
        let mut node = Node::new(name);
        let ann = &mut node.metadata.annotations;
        ann.insert(annotations::CURRENT_CONFIGURATION.into(), current.into());
        ann.insert(annotations::DESIRED_CONFIGURATION.into(), desired.into());
        ann.insert(annotations::UPDATE_STATE.into(), state.into());
        node
    }

    fn settled(name: &str) -> Node {
        node(name, OLD, OLD, update_state::DONE)
    }

    #[test]
    fn test_first_member_selected_with_budget_one() {
        let members: Vec<Node> = (0..5).map(|i| settled(&format!("worker-{i}"))).collect();
        let picked = select_candidates(&worker_pool(), &members, 1);

        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name(), "worker-0");
    }

    #[test]
    fn test_selection_is_stable() {
        let members: Vec<Node> = (0..5).map(|i| settled(&format!("worker-{i}"))).collect();
        let a: Vec<&str> = select_candidates(&worker_pool(), &members, 3)
            .into_iter()
            .map(Node::name)
            .collect();
        let b: Vec<&str> = select_candidates(&worker_pool(), &members, 3)
            .into_iter()
            .map(Node::name)
            .collect();
        assert_eq!(a, vec!["worker-0", "worker-1", "worker-2"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_in_flight_member_uses_budget() {
        let members = vec![
            node("worker-0", OLD, NEW, update_state::WORKING),
            settled("worker-1"),
            settled("worker-2"),
        ];
        assert!(select_candidates(&worker_pool(), &members, 1).is_empty());

        let picked = select_candidates(&worker_pool(), &members, 2);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name(), "worker-1");
    }

    #[test]
    fn test_failing_member_holds_sole_slot() {
        let members = vec![
            node("worker-0", NEW, NEW, update_state::DEGRADED),
            settled("worker-1"),
        ];
        assert!(select_candidates(&worker_pool(), &members, 1).is_empty());
    }

    #[test]
    fn test_failing_mid_update_holds_one_slot() {
        let members = vec![
            node("worker-0", OLD, NEW, update_state::DEGRADED),
            settled("worker-1"),
            settled("worker-2"),
            settled("worker-3"),
        ];
        assert!(select_candidates(&worker_pool(), &members, 1).is_empty());

        let picked = select_candidates(&worker_pool(), &members, 2);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name(), "worker-1");
    }

    #[test]
    fn test_failing_on_other_configuration_is_not_counted() {
        let members = vec![
            node("worker-0", OLD, OLD, update_state::DEGRADED),
            settled("worker-1"),
        ];
        // worker-0 is failing, but not on the target, so it is itself a candidate.
        let picked = select_candidates(&worker_pool(), &members, 1);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name(), "worker-0");
    }

    #[test]
    fn test_nothing_to_do_when_all_targeted() {
        let members = vec![node("worker-0", NEW, NEW, update_state::DONE)];
        assert!(select_candidates(&worker_pool(), &members, 5).is_empty());
    }

    fn arb_member() -> impl Strategy<Value = (u8, u8, u8)> {
        (0u8..2, 0u8..2, 0u8..4)
    }

    fn build(i: usize, (current, desired, state): (u8, u8, u8)) -> Node {
        let config = |v| if v == 0 { OLD } else { NEW };
        let state = [
            update_state::DONE,
            update_state::WORKING,
            update_state::DEGRADED,
            update_state::UNRECONCILABLE,
        ][state as usize];
        node(&format!("n{i}"), config(current), config(desired), state)
    }

    proptest! {
        #[test]
        fn prop_capacity_monotonicity(
            specs in proptest::collection::vec(arb_member(), 0..20),
            budget in 0usize..8,
        ) {
            let members: Vec<Node> = specs.into_iter().enumerate().map(|(i, s)| build(i, s)).collect();
            let pool = worker_pool();

            // Each member holds at most one slot: it is either mid-update or
            // failing on the target, never both.
            let busy = members
                .iter()
                .filter(|n| {
                    let failing = n.desired_configuration() == NEW && is_node_failing(n);
                    failing || is_node_unavailable(n)
                })
                .count();
            let signaled = members.iter().filter(|n| n.desired_configuration() != NEW).count();

            let picked = select_candidates(&pool, &members, budget);

            prop_assert_eq!(picked.len(), budget.saturating_sub(busy).min(signaled));
            for n in &picked {
                prop_assert_ne!(n.desired_configuration(), NEW);
            }
        }
    }
}
