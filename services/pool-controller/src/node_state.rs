//! Node readiness and update-progress predicates.
//!
//! These read the conditions written by the kubelet-equivalent and the
//! annotations written by the node agent. They never look at pools.

use nodepool_api::{update_state, ConditionStatus, Node};

/// Conditions that make a node unavailable when they report `True`.
const PRESSURE_CONDITIONS: [&str; 3] = ["DiskPressure", "MemoryPressure", "NetworkUnavailable"];

/// Check whether a node is ready to run workloads.
///
/// Only conditions the node actually reports are inspected; a node with no
/// conditions is considered ready.
pub fn check_node_ready(node: &Node) -> Result<(), String> {
    if let Some(ready) = node.condition("Ready") {
        if ready.status != ConditionStatus::True {
            return Err(format!(
                "node {} is reporting NotReady={:?}",
                node.name(),
                ready.status
            ));
        }
    }

    for type_ in PRESSURE_CONDITIONS {
        if node
            .condition(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
        {
            return Err(format!("node {} is reporting {type_}", node.name()));
        }
    }

    if node.spec.unschedulable {
        return Err(format!("node {} is reporting Unschedulable", node.name()));
    }

    Ok(())
}

pub fn is_node_ready(node: &Node) -> bool {
    check_node_ready(node).is_ok()
}

/// A node is managed once the agent has reported a current configuration.
pub fn is_node_managed(node: &Node) -> bool {
    !node.current_configuration().is_empty()
}

/// The agent finished applying the configuration it was asked for.
pub fn is_node_done(node: &Node) -> bool {
    is_node_managed(node)
        && node.current_configuration() == node.desired_configuration()
        && node.update_state() == update_state::DONE
}

/// The agent reports it cannot apply its desired configuration.
pub fn is_node_failing(node: &Node) -> bool {
    matches!(
        node.update_state(),
        update_state::DEGRADED | update_state::UNRECONCILABLE
    )
}

/// The node is not ready, or is mid-update and not failing.
///
/// A ready node that is failing is left out; it holds its slot through the
/// failing count instead.
pub fn is_node_unavailable(node: &Node) -> bool {
    let desired = node.desired_configuration();
    let in_flight = !desired.is_empty() && node.current_configuration() != desired;
    let working = node.update_state() == update_state::WORKING;

    !is_node_ready(node) || ((in_flight || working) && !is_node_failing(node))
}

/// Running `target` and done.
pub fn is_node_updated(node: &Node, target: &str) -> bool {
    node.current_configuration() == target
        && node.desired_configuration() == target
        && is_node_done(node)
}

#[cfg(test)]
mod tests {
    use nodepool_api::{annotations, NodeCondition};

    use super::*;

    fn node(current: &str, desired: &str, state: &str) -> Node {
        let mut node = Node::new("n1");
        let ann = &mut node.metadata.annotations;
        for (key, value) in [
            (annotations::CURRENT_CONFIGURATION, current),
            (annotations::DESIRED_CONFIGURATION, desired),
            (annotations::UPDATE_STATE, state),
        ] {
            if !value.is_empty() {
                ann.insert(key.to_string(), value.to_string());
            }
        }
        node
    }

    #[test]
    fn test_ready_conditions() {
        let mut n = node("c1", "c1", "Done");
        assert!(is_node_ready(&n));

        n.status
            .conditions
            .push(NodeCondition::new("Ready", ConditionStatus::True));
        assert!(is_node_ready(&n));

        n.status
            .conditions
            .push(NodeCondition::new("DiskPressure", ConditionStatus::True));
        let err = check_node_ready(&n).unwrap_err();
        assert!(err.contains("DiskPressure"));

        n.status.conditions[1].status = ConditionStatus::False;
        n.status.conditions[0].status = ConditionStatus::Unknown;
        let err = check_node_ready(&n).unwrap_err();
        assert!(err.contains("NotReady"));
    }

    #[test]
    fn test_network_unavailable_is_not_ready() {
        let mut n = node("c1", "c1", "Done");
        n.status
            .conditions
            .push(NodeCondition::new("NetworkUnavailable", ConditionStatus::True));
        let err = check_node_ready(&n).unwrap_err();
        assert!(err.contains("NetworkUnavailable"));
    }

    #[test]
    fn test_unschedulable_is_not_ready() {
        let mut n = node("c1", "c1", "Done");
        n.spec.unschedulable = true;
        assert!(!is_node_ready(&n));
        assert!(is_node_unavailable(&n));
    }

    #[test]
    fn test_done_and_updated() {
        assert!(is_node_done(&node("c1", "c1", "Done")));
        assert!(!is_node_done(&node("c1", "c2", "Done")));
        assert!(!is_node_done(&node("c1", "c1", "Working")));
        assert!(!is_node_done(&node("", "", "Done")));

        assert!(is_node_updated(&node("c2", "c2", "Done"), "c2"));
        assert!(!is_node_updated(&node("c1", "c1", "Done"), "c2"));
    }

    #[test]
    fn test_unavailable() {
        assert!(!is_node_unavailable(&node("c1", "c1", "Done")));
        assert!(!is_node_unavailable(&node("c1", "", "")));
        assert!(is_node_unavailable(&node("c1", "c2", "Done")));
        assert!(is_node_unavailable(&node("c1", "c1", "Working")));
    }

    #[test]
    fn test_failing_mid_update_is_not_unavailable() {
        assert!(!is_node_unavailable(&node("c1", "c2", "Degraded")));
        assert!(!is_node_unavailable(&node("c1", "c2", "Unreconcilable")));

        let mut n = node("c1", "c2", "Degraded");
        n.spec.unschedulable = true;
        assert!(is_node_unavailable(&n));
    }

    #[test]
    fn test_failing() {
        assert!(is_node_failing(&node("c1", "c2", "Degraded")));
        assert!(is_node_failing(&node("c1", "c2", "Unreconcilable")));
        assert!(!is_node_failing(&node("c1", "c2", "Working")));
        assert!(!is_node_managed(&node("", "c2", "")));
    }
}
