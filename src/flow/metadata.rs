// SPDX-License-Identifier: MIT

//! Presentation metadata for nodes
//!
//! Pure inference from a node's name and contracts, for editors and
//! visualizers. Nothing in the store or engine reads it.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::contract::{ContractSet, NodeContracts};
use super::node::Node;

/// Keyword -> (category, icon), checked in order
static KEYWORDS: Lazy<Vec<(&'static str, &'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("validate", "validation", "shield-check"),
        ("check", "validation", "shield-check"),
        ("verify", "validation", "shield-check"),
        ("route", "control", "git-branch"),
        ("router", "control", "git-branch"),
        ("branch", "control", "git-branch"),
        ("switch", "control", "git-branch"),
        ("subflow", "control", "layers"),
        ("flow", "control", "layers"),
        ("read", "input", "download"),
        ("load", "input", "download"),
        ("fetch", "input", "download"),
        ("input", "input", "download"),
        ("source", "input", "download"),
        ("write", "output", "upload"),
        ("save", "output", "upload"),
        ("export", "output", "upload"),
        ("output", "output", "upload"),
        ("sink", "output", "upload"),
        ("template", "transform", "shuffle"),
        ("format", "transform", "shuffle"),
        ("render", "transform", "shuffle"),
        ("transform", "transform", "shuffle"),
        ("map", "transform", "shuffle"),
        ("parse", "transform", "shuffle"),
        ("set", "data", "database"),
        ("store", "data", "database"),
    ]
});

const DEFAULT_CATEGORY: &str = "general";
const DEFAULT_ICON: &str = "box";

/// Explicit values that win over inference
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MetadataOverrides {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// One contract-bound key shown as a port
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PortMetadata {
    pub key: String,
    pub contract: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NodeMetadata {
    pub display_name: String,
    pub category: String,
    pub icon: String,
    pub inputs: Vec<PortMetadata>,
    pub outputs: Vec<PortMetadata>,
}

/// Infer display metadata from a node (or node type) name and its contracts
pub fn infer_metadata(
    name: &str,
    contracts: &NodeContracts,
    overrides: &MetadataOverrides,
) -> NodeMetadata {
    let mut words = split_words(name);
    if words.len() > 1 && words.last().map(String::as_str) == Some("node") {
        words.pop();
    }

    let (category, icon) = KEYWORDS
        .iter()
        .find(|(keyword, _, _)| words.iter().any(|w| w == keyword))
        .map(|(_, category, icon)| (*category, *icon))
        .unwrap_or((DEFAULT_CATEGORY, DEFAULT_ICON));

    NodeMetadata {
        display_name: overrides
            .display_name
            .clone()
            .unwrap_or_else(|| title_case(&words)),
        category: overrides
            .category
            .clone()
            .unwrap_or_else(|| category.to_string()),
        icon: overrides.icon.clone().unwrap_or_else(|| icon.to_string()),
        inputs: ports(&contracts.inputs),
        outputs: ports(&contracts.outputs),
    }
}

/// Infer metadata for a placed node from its name. The node's kind supplies
/// the category and icon when the name matches no keyword.
pub fn infer_node_metadata(node: &dyn Node, overrides: &MetadataOverrides) -> NodeMetadata {
    let contracts = node.contracts();
    let mut meta = infer_metadata(node.name(), &contracts, overrides);
    if meta.category == DEFAULT_CATEGORY && overrides.category.is_none() {
        let by_kind = infer_metadata(node.kind(), &contracts, overrides);
        meta.category = by_kind.category;
        meta.icon = by_kind.icon;
    }
    meta
}

fn ports(set: &ContractSet) -> Vec<PortMetadata> {
    set.keys()
        .filter_map(|key| {
            set.get(key).map(|contract| PortMetadata {
                key: key.clone(),
                contract: contract.name.clone(),
                required: contract.required,
            })
        })
        .collect()
}

/// Lowercase words of a camelCase, snake_case, kebab-case or spaced name
fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn title_case(words: &[String]) -> String {
    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
