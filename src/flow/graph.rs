// SPDX-License-Identifier: MIT

//! Serializable flow structure
//!
//! Describes nodes (by registry kind and params), routing edges and nested
//! flows. Used to export a flow for visualization and to rebuild it through
//! a `NodeRegistry`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pack::Namespace;

/// Top-level (or nested) flow description
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GraphDescription {
    /// Namespace the flow is bound to. Nested flows are rebound under their
    /// owning node when loaded.
    #[serde(default)]
    pub namespace: Namespace,
    /// Defaults to the first node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub edges: Vec<EdgeDescription>,
}

/// Node as stored in a description
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NodeDescription {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subflow: Option<Box<GraphDescription>>,
}

/// Routing edge: `label` returned by `from` continues at `to`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EdgeDescription {
    pub from: String,
    pub label: String,
    pub to: String,
}

impl GraphDescription {
    /// Node descriptions of this flow and every nested flow, depth first
    pub fn walk(&self) -> Vec<&NodeDescription> {
        let mut out = Vec::new();
        for node in &self.nodes {
            out.push(node);
            if let Some(sub) = &node.subflow {
                out.extend(sub.walk());
            }
        }
        out
    }
}
