// SPDX-License-Identifier: MIT

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::engine::Flow;
use super::node::Node;
use super::nodes::{SetNode, SubflowNode, TemplateNode};
use crate::error::FlowError;

/// Everything a factory needs to build one node
pub struct NodeSpec {
    pub id: String,
    pub name: String,
    pub params: Value,
    /// Already-built nested flow, for kinds that own one
    pub subflow: Option<Flow>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, params: Value) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            params,
            subflow: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_subflow(mut self, flow: Flow) -> Self {
        self.subflow = Some(flow);
        self
    }
}

pub type NodeFactory = Arc<dyn Fn(NodeSpec) -> Result<Box<dyn Node>, FlowError> + Send + Sync>;

/// Maps node kinds to factories. Owned by whoever loads graph descriptions.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: HashMap<String, NodeFactory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `set`, `template` and `subflow`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(SetNode::KIND, |spec| {
            Ok(Box::new(SetNode::from_spec(spec)?) as Box<dyn Node>)
        });
        registry.register(TemplateNode::KIND, |spec| {
            Ok(Box::new(TemplateNode::from_spec(spec)?) as Box<dyn Node>)
        });
        registry.register(SubflowNode::KIND, |spec| {
            Ok(Box::new(SubflowNode::from_spec(spec)?) as Box<dyn Node>)
        });
        registry
    }

    /// Register a factory, replacing any previous one for `kind`
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(NodeSpec) -> Result<Box<dyn Node>, FlowError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn create(&self, kind: &str, spec: NodeSpec) -> Result<Box<dyn Node>, FlowError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| FlowError::UnknownNodeKind(kind.to_string()))?;
        factory(spec)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NodeError;
    use crate::flow::node::NodeContext;
    use async_trait::async_trait;
    use serde_json::json;

    struct Noop {
        id: String,
    }

    #[async_trait]
    impl Node for Noop {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> &str {
            "noop"
        }

        async fn compute(&self, _ctx: &NodeContext, _input: &Value) -> Result<Value, NodeError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = NodeRegistry::with_builtins();
        assert_eq!(registry.kinds(), vec!["set", "subflow", "template"]);
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = NodeRegistry::new();
        registry.register("noop", |spec| Ok(Box::new(Noop { id: spec.id }) as Box<dyn Node>));

        assert!(registry.contains("noop"));
        let node = registry.create("noop", NodeSpec::new("n1", json!(null))).unwrap();
        assert_eq!(node.id(), "n1");
        assert_eq!(node.kind(), "noop");
    }

    #[test]
    fn test_unknown_kind() {
        let registry = NodeRegistry::new();
        assert!(matches!(
            registry.create("nope", NodeSpec::new("n1", Value::Null)),
            Err(FlowError::UnknownNodeKind(ref kind)) if kind == "nope"
        ));
    }

    #[test]
    fn test_registries_are_independent() {
        let mut a = NodeRegistry::with_builtins();
        let b = NodeRegistry::with_builtins();
        a.register("noop", |spec| Ok(Box::new(Noop { id: spec.id }) as Box<dyn Node>));

        assert!(a.contains("noop"));
        assert!(!b.contains("noop"));
    }

    #[test]
    fn test_builtin_rejects_bad_params() {
        let registry = NodeRegistry::with_builtins();
        let result = registry.create("set", NodeSpec::new("s", json!({"values": 3})));
        assert!(matches!(result, Err(FlowError::Description(_))));
    }
}
