//! Conflict-safe node mutations.
//!
//! Every write follows the same shape: take a base copy of the node, build
//! the desired copy from it, and submit the merge patch between the two
//! only when they differ. Patches carry the base's resource version, so a
//! write racing the node agent fails with a conflict and is retried against
//! a freshly fetched base.

use std::sync::Arc;

use nodepool_api::{annotations, Configuration, LabelDirective, Node, TaintDirective};
use nodepool_reconcile::{create_merge_patch, is_empty_patch, retry_on_conflict, Backoff, Conflict};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::ClusterApi;
use crate::error::{ControllerError, ControllerResult};

/// Writes labels, taints and the desired configuration onto nodes.
pub struct NodeMutator {
    api: Arc<dyn ClusterApi>,
    backoff: Backoff,
}

impl NodeMutator {
    pub fn new(api: Arc<dyn ClusterApi>, backoff: Backoff) -> Self {
        Self { api, backoff }
    }

    /// Bring `node`'s labels and taints in line with `configuration`.
    ///
    /// The first attempt works from `node` as given; retries re-fetch it.
    /// Returns whether a patch was sent.
    pub async fn converge_labels_and_taints(
        &self,
        node: &Node,
        configuration: &Configuration,
    ) -> ControllerResult<bool> {
        let name = node.name();
        let result: ControllerResult<bool> = retry_on_conflict(&self.backoff, move |attempt| async move {
            let base = if attempt == 0 {
                node.clone()
            } else {
                self.api.get_node(name).await?
            };

            let mut desired = base.clone();
            apply_label_directives(&mut desired, &configuration.spec.labels);
            apply_taint_directives(&mut desired, &configuration.spec.taints);

            self.patch_if_changed(&base, &desired).await
        })
        .await;

        let patched = terminal_error(name, result)?;
        if patched {
            debug!(node = %name, configuration = %configuration.name, "Converged labels and taints");
        }
        Ok(patched)
    }

    /// Ask the node agent on `name` to move to `target`.
    ///
    /// Always works from a freshly fetched node. Returns whether a patch
    /// was sent.
    pub async fn set_desired_configuration(&self, name: &str, target: &str) -> ControllerResult<bool> {
        let result: ControllerResult<bool> = retry_on_conflict(&self.backoff, move |_| async move {
            let base = self.api.get_node(name).await?;
            if base.desired_configuration() == target {
                return Ok(false);
            }

            let mut desired = base.clone();
            desired
                .metadata
                .annotations
                .insert(annotations::DESIRED_CONFIGURATION.to_string(), target.to_string());

            self.patch_if_changed(&base, &desired).await
        })
        .await;

        let patched = terminal_error(name, result)?;
        if patched {
            info!(node = %name, configuration = %target, "Set desired configuration");
        }
        Ok(patched)
    }

    async fn patch_if_changed(&self, base: &Node, desired: &Node) -> ControllerResult<bool> {
        if base == desired {
            return Ok(false);
        }

        let original = serde_json::to_value(base)?;
        let modified = serde_json::to_value(desired)?;
        let mut patch = create_merge_patch(&original, &modified);
        if is_empty_patch(&patch) {
            return Ok(false);
        }
        if let Some(version) = &base.metadata.resource_version {
            patch["metadata"]["resourceVersion"] = Value::String(version.clone());
        }

        self.api.patch_node(base.name(), &patch).await?;
        Ok(true)
    }
}

/// Classify the error left after conflict retries stopped.
fn terminal_error(node: &str, result: ControllerResult<bool>) -> ControllerResult<bool> {
    result.map_err(|e| match e {
        ControllerError::Client(source) if source.is_conflict() => {
            ControllerError::ConflictExhausted {
                node: node.to_string(),
                source,
            }
        }
        ControllerError::Client(source) => ControllerError::MutationFailed {
            node: node.to_string(),
            source,
        },
        other => other,
    })
}

/// Set or remove labels per directive.
pub fn apply_label_directives(node: &mut Node, directives: &[LabelDirective]) {
    let labels = &mut node.metadata.labels;
    for directive in directives {
        if directive.exist {
            labels.insert(directive.key.clone(), directive.value.clone());
        } else {
            labels.remove(&directive.key);
        }
    }
}

/// Set or remove taints per directive, matching existing taints by key.
///
/// A present taint is overwritten whole, so its value and effect always
/// follow the directive.
pub fn apply_taint_directives(node: &mut Node, directives: &[TaintDirective]) {
    let taints = &mut node.spec.taints;
    for directive in directives {
        let existing = taints.iter().position(|t| t.key == directive.taint.key);
        match (directive.exist, existing) {
            (true, Some(i)) => taints[i] = directive.taint.clone(),
            (true, None) => taints.push(directive.taint.clone()),
            (false, Some(i)) => {
                taints.remove(i);
            }
            (false, None) => {}
        }
    }
}
