// SPDX-License-Identifier: MIT

//! Built-in node kinds: `set`, `template` and `subflow`

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::contract::{Contract, ContractSet, NodeContracts};
use super::engine::{Flow, FlowOutcome};
use super::node::{Node, NodeContext, COMPLETE};
use super::registry::NodeSpec;
use super::runtime::FlowRuntime;
use crate::error::{FlowError, NodeError};
use crate::pack::Namespace;

static TEXT_CONTRACT: Lazy<Contract> =
    Lazy::new(|| Contract::new("Text", json!({"type": "string"})));

fn parse_params<T: DeserializeOwned>(spec: &NodeSpec, kind: &str) -> Result<T, FlowError> {
    serde_json::from_value(spec.params.clone()).map_err(|e| {
        FlowError::Description(format!("{} node '{}': {}", kind, spec.id, e))
    })
}

fn reject_subflow(spec: &NodeSpec, kind: &str) -> Result<(), FlowError> {
    if spec.subflow.is_some() {
        return Err(FlowError::Description(format!(
            "{} node '{}' does not take a subflow",
            kind, spec.id
        )));
    }
    Ok(())
}

// --- set ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetParams {
    pub values: BTreeMap<String, Value>,
}

/// Writes constant values into its own namespace
pub struct SetNode {
    id: String,
    name: String,
    params: SetParams,
}

impl SetNode {
    pub const KIND: &'static str = "set";

    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            params: SetParams::default(),
        }
    }

    pub fn value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.values.insert(key.into(), value);
        self
    }

    pub fn from_spec(spec: NodeSpec) -> Result<Self, FlowError> {
        reject_subflow(&spec, Self::KIND)?;
        let params = parse_params(&spec, Self::KIND)?;
        Ok(Self {
            id: spec.id,
            name: spec.name,
            params,
        })
    }
}

#[async_trait]
impl Node for SetNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    fn params(&self) -> Value {
        json!(self.params)
    }

    async fn compute(&self, _ctx: &NodeContext, _input: &Value) -> Result<Value, NodeError> {
        Ok(Value::Object(
            self.params
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        ))
    }

    async fn finalize(
        &self,
        ctx: &NodeContext,
        _input: &Value,
        output: &Value,
    ) -> Result<String, NodeError> {
        if let Some(values) = output.as_object() {
            for (key, value) in values {
                ctx.write(key, value.clone())?;
            }
        }
        Ok(COMPLETE.to_string())
    }
}

// --- template ---

/// One value substituted into a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInput {
    pub key: String,
    /// Where to read the key; defaults to the owning flow's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
    /// Name used inside `{...}`; defaults to the key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateParams {
    pub template: String,
    #[serde(default)]
    pub inputs: Vec<TemplateInput>,
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_output() -> String {
    "text".to_string()
}

/// Renders `{placeholder}` text from stored values and writes the result
pub struct TemplateNode {
    id: String,
    name: String,
    params: TemplateParams,
}

impl TemplateNode {
    pub const KIND: &'static str = "template";

    pub fn new(id: impl Into<String>, template: impl Into<String>, output: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            params: TemplateParams {
                template: template.into(),
                inputs: Vec::new(),
                output: output.into(),
            },
        }
    }

    /// Substitute `{key}` with the value read from the flow's namespace
    pub fn input(mut self, key: impl Into<String>) -> Self {
        self.params.inputs.push(TemplateInput {
            key: key.into(),
            namespace: None,
            placeholder: None,
        });
        self
    }

    /// Substitute `{key}` with the value read from `namespace`
    pub fn input_from(mut self, key: impl Into<String>, namespace: Namespace) -> Self {
        self.params.inputs.push(TemplateInput {
            key: key.into(),
            namespace: Some(namespace),
            placeholder: None,
        });
        self
    }

    pub fn from_spec(spec: NodeSpec) -> Result<Self, FlowError> {
        reject_subflow(&spec, Self::KIND)?;
        let params = parse_params(&spec, Self::KIND)?;
        Ok(Self {
            id: spec.id,
            name: spec.name,
            params,
        })
    }
}

/// Substitute `{name}` tokens in one pass; inserted text is never rescanned
/// and tokens without a value are kept as written
fn render(template: &str, values: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let token = after
            .find(|c| c == '{' || c == '}')
            .filter(|&end| after[end..].starts_with('}'))
            .map(|end| &after[..end]);

        match token.and_then(|name| values.get(name).map(|value| (name, value))) {
            Some((name, value)) => {
                match value {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
                rest = &after[name.len() + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl Node for TemplateNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    fn params(&self) -> Value {
        json!(self.params)
    }

    fn contracts(&self) -> NodeContracts {
        NodeContracts {
            inputs: ContractSet::new(),
            outputs: ContractSet::new().with(&self.params.output, TEXT_CONTRACT.clone()),
        }
    }

    async fn prepare(&self, ctx: &NodeContext) -> Result<Value, NodeError> {
        let mut values = Map::new();
        for input in &self.params.inputs {
            let namespace = input.namespace.as_ref().unwrap_or(ctx.flow_namespace());
            let value = ctx.read_required(&input.key, namespace)?;
            let placeholder = input.placeholder.clone().unwrap_or_else(|| input.key.clone());
            values.insert(placeholder, value);
        }
        Ok(Value::Object(values))
    }

    async fn compute(&self, _ctx: &NodeContext, input: &Value) -> Result<Value, NodeError> {
        let empty = Map::new();
        let values = input.as_object().unwrap_or(&empty);
        Ok(Value::String(render(&self.params.template, values)))
    }

    async fn finalize(
        &self,
        ctx: &NodeContext,
        _input: &Value,
        output: &Value,
    ) -> Result<String, NodeError> {
        ctx.write(&self.params.output, output.clone())?;
        Ok(COMPLETE.to_string())
    }
}

// --- subflow ---

/// Runs a nested flow placed under the node's own namespace
pub struct SubflowNode {
    id: String,
    name: String,
    flow: Flow,
}

impl SubflowNode {
    pub const KIND: &'static str = "subflow";

    pub fn new(id: impl Into<String>, flow: Flow) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            flow,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn from_spec(spec: NodeSpec) -> Result<Self, FlowError> {
        let flow = spec.subflow.ok_or_else(|| {
            FlowError::Description(format!("subflow node '{}' has no subflow", spec.id))
        })?;
        Ok(Self {
            id: spec.id,
            name: spec.name,
            flow,
        })
    }
}

#[async_trait]
impl Node for SubflowNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        Self::KIND
    }

    fn attach(&mut self, runtime: &FlowRuntime, namespace: &Namespace) -> Result<(), FlowError> {
        self.flow.rebind(runtime, namespace)
    }

    fn subflow(&self) -> Option<&Flow> {
        Some(&self.flow)
    }

    async fn compute(&self, _ctx: &NodeContext, _input: &Value) -> Result<Value, NodeError> {
        let outcome = self.flow.run().await?;
        serde_json::to_value(&outcome).map_err(|e| NodeError::other(e.to_string()))
    }

    /// Routes on the nested flow's last label
    async fn finalize(
        &self,
        _ctx: &NodeContext,
        _input: &Value,
        output: &Value,
    ) -> Result<String, NodeError> {
        let outcome: FlowOutcome = serde_json::from_value(output.clone())
            .map_err(|e| NodeError::other(e.to_string()))?;
        Ok(outcome.last_label)
    }
}
