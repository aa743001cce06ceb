// SPDX-License-Identifier: MIT

//! Graph loader - builds flows from descriptions
//!
//! Descriptions are read from YAML or JSON files and turned into flows
//! through a caller-owned `NodeRegistry`.

use std::fs;
use std::path::Path;

use super::engine::Flow;
use super::graph::GraphDescription;
use super::registry::{NodeRegistry, NodeSpec};
use super::runtime::FlowRuntime;
use crate::error::{FlowError, PackflowError};

/// Build a flow (and its nested flows) from a description
pub fn load_structure(
    desc: &GraphDescription,
    registry: &NodeRegistry,
    runtime: FlowRuntime,
) -> Result<Flow, FlowError> {
    let mut flow = Flow::new(desc.namespace.clone(), runtime.clone());

    for node_desc in &desc.nodes {
        let subflow = node_desc
            .subflow
            .as_deref()
            .map(|sub| load_structure(sub, registry, runtime.clone()))
            .transpose()?;

        let mut spec = NodeSpec::new(&node_desc.id, node_desc.params.clone());
        if let Some(name) = &node_desc.name {
            spec = spec.with_name(name);
        }
        spec.subflow = subflow;

        let node = registry.create(&node_desc.kind, spec)?;
        if node.id() != node_desc.id {
            return Err(FlowError::Description(format!(
                "factory for '{}' built node '{}' instead of '{}'",
                node_desc.kind,
                node.id(),
                node_desc.id
            )));
        }
        flow.add_boxed(node)?;
    }

    for edge in &desc.edges {
        flow.connect(&edge.from, &edge.label, &edge.to)?;
    }
    if let Some(entry) = &desc.entry {
        flow.set_entry(entry)?;
    }

    log::info!(
        "Loaded flow '{}' with {} nodes and {} edges",
        desc.namespace,
        desc.nodes.len(),
        desc.edges.len()
    );
    Ok(flow)
}

/// Reads and writes graph descriptions
pub struct GraphLoader;

impl GraphLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a description from a file; `.json` is parsed as JSON, anything
    /// else as YAML
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<GraphDescription, PackflowError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::parse_json(&content),
            _ => Self::parse_yaml(&content),
        }
    }

    pub fn parse_yaml(content: &str) -> Result<GraphDescription, PackflowError> {
        let desc: GraphDescription = serde_yaml::from_str(content)?;
        Ok(desc)
    }

    pub fn parse_json(content: &str) -> Result<GraphDescription, PackflowError> {
        let desc: GraphDescription = serde_json::from_str(content)?;
        Ok(desc)
    }

    pub fn to_yaml(desc: &GraphDescription) -> Result<String, PackflowError> {
        Ok(serde_yaml::to_string(desc)?)
    }

    pub fn to_json(desc: &GraphDescription) -> Result<String, PackflowError> {
        Ok(serde_json::to_string_pretty(desc)?)
    }
}

impl Default for GraphLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::nodes::{SetNode, SubflowNode, TemplateNode};
    use crate::pack::Namespace;
    use serde_json::json;

    const NESTED: &str = r#"
namespace: root
entry: outer
nodes:
  - id: outer
    name: Outer
    kind: subflow
    subflow:
      nodes:
        - id: inner
          kind: set
          params:
            values:
              answer: 42
  - id: report
    kind: template
    params:
      template: "answer={answer}"
      inputs:
        - key: answer
          namespace: root.outer.inner
      output: line
edges:
  - from: outer
    label: complete
    to: report
"#;

    fn ns(s: &str) -> Namespace {
        Namespace::new(s).unwrap()
    }

    #[test]
    fn test_load_nested_structure() {
        let desc = GraphLoader::parse_yaml(NESTED).unwrap();
        let flow = load_structure(&desc, &NodeRegistry::with_builtins(), FlowRuntime::default())
            .unwrap();

        assert_eq!(flow.entry(), Some("outer"));
        assert_eq!(flow.node_ids().collect::<Vec<_>>(), vec!["outer", "report"]);
        assert_eq!(flow.node("outer").unwrap().name(), "Outer");

        let inner = flow.node("outer").unwrap().subflow().unwrap();
        assert_eq!(inner.namespace(), &ns("root.outer"));
        assert_eq!(inner.node_namespace("inner"), Some(&ns("root.outer.inner")));
    }

    #[tokio::test]
    async fn test_loaded_flow_runs() {
        let runtime = FlowRuntime::default();
        let desc = GraphLoader::parse_yaml(NESTED).unwrap();
        let flow = load_structure(&desc, &NodeRegistry::with_builtins(), runtime.clone()).unwrap();

        let outcome = flow.run().await.unwrap();
        assert_eq!(outcome.path, vec!["outer", "report"]);
        assert_eq!(
            runtime
                .pack
                .read("line", &ns("root.report"), &crate::pack::AccessPattern::all())
                .unwrap(),
            Some(json!("answer=42"))
        );
    }

    #[test]
    fn test_export_load_round_trip() {
        let mut inner = Flow::new(Namespace::root(), FlowRuntime::default());
        inner.add_node(SetNode::new("inner").value("x", json!(1))).unwrap();

        let mut flow = Flow::new(ns("root"), FlowRuntime::default());
        flow.add_node(SubflowNode::new("outer", inner).with_name("Outer"))
            .unwrap();
        flow.add_node(TemplateNode::new("t", "{x}", "text").input_from("x", ns("root.outer.inner")))
            .unwrap();
        flow.connect("outer", "complete", "t").unwrap();
        flow.connect("t", "complete", "outer").unwrap();

        let exported = flow.export_structure();
        let yaml = GraphLoader::to_yaml(&exported).unwrap();
        let reparsed = GraphLoader::parse_yaml(&yaml).unwrap();
        assert_eq!(reparsed, exported);

        let rebuilt =
            load_structure(&reparsed, &NodeRegistry::with_builtins(), FlowRuntime::default())
                .unwrap();
        assert_eq!(rebuilt.export_structure(), exported);

        let json = GraphLoader::to_json(&exported).unwrap();
        assert_eq!(GraphLoader::parse_json(&json).unwrap(), exported);
    }

    #[test]
    fn test_unknown_kind_and_bad_edges() {
        let registry = NodeRegistry::with_builtins();

        let desc = GraphLoader::parse_yaml("nodes:\n  - id: a\n    kind: mystery\n").unwrap();
        assert!(matches!(
            load_structure(&desc, &registry, FlowRuntime::default()),
            Err(FlowError::UnknownNodeKind(_))
        ));

        let desc = GraphLoader::parse_yaml(
            "nodes:\n  - id: a\n    kind: set\n    params: {values: {}}\nedges:\n  - {from: a, label: complete, to: b}\n",
        )
        .unwrap();
        assert!(matches!(
            load_structure(&desc, &registry, FlowRuntime::default()),
            Err(FlowError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_factory_must_keep_id() {
        let mut registry = NodeRegistry::new();
        registry.register("set", |spec| {
            let renamed = NodeSpec::new(format!("{}-x", spec.id), spec.params);
            Ok(Box::new(SetNode::from_spec(renamed)?) as Box<dyn crate::flow::node::Node>)
        });

        let desc = GraphLoader::parse_yaml(
            "nodes:\n  - id: a\n    kind: set\n    params: {values: {}}\n",
        )
        .unwrap();
        assert!(matches!(
            load_structure(&desc, &registry, FlowRuntime::default()),
            Err(FlowError::Description(_))
        ));
    }

    #[test]
    fn test_invalid_yaml_returns_error() {
        let result = GraphLoader::parse_yaml("nodes:\n  - invalid structure\n");
        assert!(result.is_err());
    }
}
