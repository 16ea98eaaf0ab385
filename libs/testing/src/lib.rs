//! Test fixtures.
//!
//! Builders for the objects the controller works with. Pools built here
//! select nodes by a role label, so `NodeBuilder::new("n").role("infra")`
//! is matched by `PoolBuilder::new("infra")`.

use chrono::Utc;
use nodepool_api::{
    annotations, update_state, ConditionStatus, Configuration, IntOrPercent, LabelDirective,
    LabelSelector, Node, NodeCondition, Pool, Taint, TaintDirective,
};

/// Prefix of the label that places a node in a role.
pub const ROLE_LABEL_PREFIX: &str = "node-role.nodepool.io/";

/// Label key for `role`.
pub fn role_label(role: &str) -> String {
    format!("{ROLE_LABEL_PREFIX}{role}")
}

/// Builder for [`Node`] fixtures. Nodes start ready with no annotations.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let mut node = Node::new(name);
        node.status
            .conditions
            .push(NodeCondition::new("Ready", ConditionStatus::True));
        Self { node }
    }

    pub fn role(self, role: &str) -> Self {
        self.label(role_label(role), "")
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.node.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn taint(mut self, taint: Taint) -> Self {
        self.node.spec.taints.push(taint);
        self
    }

    pub fn current(self, configuration: &str) -> Self {
        self.annotation(annotations::CURRENT_CONFIGURATION, configuration)
    }

    pub fn desired(self, configuration: &str) -> Self {
        self.annotation(annotations::DESIRED_CONFIGURATION, configuration)
    }

    pub fn state(self, state: &str) -> Self {
        self.annotation(annotations::UPDATE_STATE, state)
    }

    /// Settled on `configuration`: current and desired match and the agent is done.
    pub fn at(self, configuration: &str) -> Self {
        self.current(configuration)
            .desired(configuration)
            .state(update_state::DONE)
    }

    /// Asked to move to `to` and still working on it.
    pub fn updating(self, from: &str, to: &str) -> Self {
        self.current(from).desired(to).state(update_state::WORKING)
    }

    /// Asked to move to `to` and reporting it cannot.
    pub fn degraded(self, from: &str, to: &str) -> Self {
        self.current(from).desired(to).state(update_state::DEGRADED)
    }

    pub fn ready(mut self, ready: bool) -> Self {
        let status = if ready {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        };
        for condition in &mut self.node.status.conditions {
            if condition.type_ == "Ready" {
                condition.status = status;
            }
        }
        self
    }

    pub fn deleting(mut self) -> Self {
        self.node.metadata.deletion_timestamp = Some(Utc::now());
        self
    }

    pub fn build(self) -> Node {
        self.node
    }

    fn annotation(mut self, key: &str, value: &str) -> Self {
        self.node
            .metadata
            .annotations
            .insert(key.to_string(), value.to_string());
        self
    }
}

/// Builder for [`Pool`] fixtures. The default selector matches the role
/// label named after the pool.
#[derive(Debug, Clone)]
pub struct PoolBuilder {
    pool: Pool,
}

impl PoolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let mut pool = Pool::new(name);
        pool.spec.node_selector = Some(LabelSelector::from_labels([(
            role_label(&pool.name),
            String::new(),
        )]));
        Self { pool }
    }

    pub fn selector(mut self, selector: LabelSelector) -> Self {
        self.pool.spec.node_selector = Some(selector);
        self
    }

    /// Use the empty selector, which would match every node.
    pub fn select_everything(self) -> Self {
        self.selector(LabelSelector::default())
    }

    pub fn no_selector(mut self) -> Self {
        self.pool.spec.node_selector = None;
        self
    }

    pub fn target(mut self, configuration: &str) -> Self {
        self.pool.spec.configuration.name = configuration.to_string();
        self
    }

    pub fn max_unavailable(mut self, count: i64) -> Self {
        self.pool.spec.max_unavailable = Some(IntOrPercent::Int(count));
        self
    }

    /// Budget as a percentage string such as `"25%"`.
    pub fn max_unavailable_percent(mut self, percent: &str) -> Self {
        self.pool.spec.max_unavailable = Some(IntOrPercent::String(percent.to_string()));
        self
    }

    pub fn paused(mut self) -> Self {
        self.pool.spec.paused = true;
        self
    }

    pub fn deleting(mut self) -> Self {
        self.pool.deletion_timestamp = Some(Utc::now());
        self
    }

    pub fn build(self) -> Pool {
        self.pool
    }
}

/// Builder for [`Configuration`] fixtures.
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    configuration: Configuration,
}

impl ConfigurationBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            configuration: Configuration::new(name),
        }
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.configuration
            .spec
            .labels
            .push(LabelDirective::present(key, value));
        self
    }

    pub fn remove_label(mut self, key: &str) -> Self {
        self.configuration
            .spec
            .labels
            .push(LabelDirective::absent(key));
        self
    }

    pub fn taint(mut self, taint: Taint) -> Self {
        self.configuration
            .spec
            .taints
            .push(TaintDirective::present(taint));
        self
    }

    pub fn remove_taint(mut self, taint: Taint) -> Self {
        self.configuration
            .spec
            .taints
            .push(TaintDirective::absent(taint));
        self
    }

    pub fn build(self) -> Configuration {
        self.configuration
    }
}
