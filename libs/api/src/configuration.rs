//! Rendered configurations.
//!
//! Only the node-metadata directives are modelled here; the rest of a
//! configuration is opaque to the controller.

use serde::{Deserialize, Serialize};

use crate::node::Taint;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,

    #[serde(default)]
    pub spec: ConfigurationSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSpec {
    #[serde(default)]
    pub labels: Vec<LabelDirective>,

    #[serde(default)]
    pub taints: Vec<TaintDirective>,
}

/// Set (`exist`) or remove a node label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDirective {
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub exist: bool,
}

/// Set (`exist`) or remove the node taint with this key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaintDirective {
    pub taint: Taint,
    pub exist: bool,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: ConfigurationSpec::default(),
        }
    }
}

impl LabelDirective {
    pub fn present(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            exist: true,
        }
    }

    pub fn absent(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            exist: false,
        }
    }
}

impl TaintDirective {
    pub fn present(taint: Taint) -> Self {
        Self { taint, exist: true }
    }

    pub fn absent(taint: Taint) -> Self {
        Self { taint, exist: false }
    }
}
