// SPDX-License-Identifier: MIT

//! Node trait and the context handed to each phase

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::contract::NodeContracts;
use super::credentials::SecretKind;
use super::engine::Flow;
use super::runtime::FlowRuntime;
use crate::error::{CredentialError, FlowError, NodeError, PackError, ValidationError};
use crate::events::EventBus;
use crate::pack::{AccessPattern, Commit, Namespace, Operation, StatePack, Writer};

/// Label returned by a finalize that has nothing special to report
pub const COMPLETE: &str = "complete";

/// Label the engine follows when a phase fails
pub const ERROR: &str = "error";

/// Phase of one node invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Prepare,
    Compute,
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Prepare => "prepare",
            Phase::Compute => "compute",
            Phase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// A unit of work in a flow.
///
/// `prepare` gathers inputs, `compute` does the work and `finalize` writes
/// results and picks the routing label. Only `compute` is mandatory.
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique within the owning flow; becomes the node's namespace segment
    fn id(&self) -> &str;

    fn name(&self) -> &str {
        self.id()
    }

    /// Registry key used to rebuild the node from a graph description
    fn kind(&self) -> &str;

    /// Construction parameters, exported with the graph structure
    fn params(&self) -> Value {
        Value::Null
    }

    /// Access granted to the node once placed at `namespace`
    fn access(&self, namespace: &Namespace) -> AccessPattern {
        AccessPattern::scoped(namespace)
    }

    fn contracts(&self) -> NodeContracts {
        NodeContracts::default()
    }

    /// Called when a flow adopts the node. Nodes owning a nested flow rebind
    /// it here.
    fn attach(&mut self, _runtime: &FlowRuntime, _namespace: &Namespace) -> Result<(), FlowError> {
        Ok(())
    }

    /// Nested flow, if the node owns one
    fn subflow(&self) -> Option<&Flow> {
        None
    }

    async fn prepare(&self, _ctx: &NodeContext) -> Result<Value, NodeError> {
        Ok(Value::Null)
    }

    async fn compute(&self, ctx: &NodeContext, input: &Value) -> Result<Value, NodeError>;

    async fn finalize(
        &self,
        _ctx: &NodeContext,
        _input: &Value,
        _output: &Value,
    ) -> Result<String, NodeError> {
        Ok(COMPLETE.to_string())
    }
}

/// Store access for one node invocation.
///
/// Every read and write goes through the node's access pattern, and
/// payloads of keys the node declared contracts for are validated.
#[derive(Clone)]
pub struct NodeContext {
    node_id: String,
    node_name: String,
    namespace: Namespace,
    flow_namespace: Namespace,
    access: AccessPattern,
    contracts: NodeContracts,
    runtime: FlowRuntime,
    run_id: Uuid,
}

impl NodeContext {
    pub fn for_node(
        node: &dyn Node,
        namespace: Namespace,
        flow_namespace: Namespace,
        runtime: FlowRuntime,
        run_id: Uuid,
    ) -> Self {
        Self {
            node_id: node.id().to_string(),
            node_name: node.name().to_string(),
            access: node.access(&namespace),
            contracts: node.contracts(),
            namespace,
            flow_namespace,
            runtime,
            run_id,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// The node's own namespace
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Namespace of the flow that owns the node
    pub fn flow_namespace(&self) -> &Namespace {
        &self.flow_namespace
    }

    pub fn access(&self) -> &AccessPattern {
        &self.access
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn pack(&self) -> &StatePack {
        &self.runtime.pack
    }

    pub fn bus(&self) -> &EventBus {
        &self.runtime.bus
    }

    pub fn runtime(&self) -> &FlowRuntime {
        &self.runtime
    }

    /// Identity recorded on the node's commits
    pub fn writer(&self) -> Writer {
        Writer::new(&self.node_id, &self.node_name)
    }

    /// Live value of `key` in `namespace`, `None` if absent or quarantined
    pub fn read(&self, key: &str, namespace: &Namespace) -> Result<Option<Value>, NodeError> {
        let value = self.runtime.pack.read(key, namespace, &self.access)?;

        if let Some(contract) = self.contracts.inputs.get(key) {
            match &value {
                Some(v) => self
                    .runtime
                    .validator
                    .validate(v, contract)
                    .map_err(|e| e.for_key(key))?,
                None if self.runtime.strict_contracts && contract.required => {
                    return Err(ValidationError::new(&contract.name, "required value is missing")
                        .for_key(key)
                        .into());
                }
                None => {}
            }
        }

        Ok(value)
    }

    pub fn read_required(&self, key: &str, namespace: &Namespace) -> Result<Value, NodeError> {
        self.read(key, namespace)?.ok_or_else(|| {
            PackError::MissingRequiredKey {
                key: key.to_string(),
                namespace: namespace.to_string(),
            }
            .into()
        })
    }

    /// Read and decode into a typed value
    pub fn read_as<T: DeserializeOwned>(
        &self,
        key: &str,
        namespace: &Namespace,
    ) -> Result<Option<T>, NodeError> {
        self.read(key, namespace)?
            .map(|value| {
                serde_json::from_value(value).map_err(|e| {
                    NodeError::other(format!(
                        "Value of '{}' in '{}' cannot be decoded: {}",
                        key, namespace, e
                    ))
                })
            })
            .transpose()
    }

    /// Write into the node's own namespace
    pub fn write(&self, key: &str, value: Value) -> Result<Commit, NodeError> {
        self.write_to(key, &self.namespace, value)
    }

    /// Write into any namespace the node's access pattern allows
    pub fn write_to(
        &self,
        key: &str,
        namespace: &Namespace,
        value: Value,
    ) -> Result<Commit, NodeError> {
        self.access.check(Operation::Write, namespace)?;
        if let Some(contract) = self.contracts.outputs.get(key) {
            self.runtime
                .validator
                .validate(&value, contract)
                .map_err(|e| e.for_key(key))?;
        }
        Ok(self
            .runtime
            .pack
            .write(key, value, namespace, &self.writer())?)
    }

    /// Quarantine a key in the node's own namespace
    pub fn quarantine(&self, key: &str, reason: &str) -> Result<Commit, NodeError> {
        self.quarantine_in(key, &self.namespace, reason)
    }

    pub fn quarantine_in(
        &self,
        key: &str,
        namespace: &Namespace,
        reason: &str,
    ) -> Result<Commit, NodeError> {
        self.access.check(Operation::Write, namespace)?;
        Ok(self
            .runtime
            .pack
            .quarantine(key, namespace, &self.writer(), reason)?)
    }

    /// Resolve a secret through the runtime's resolver. The value goes to
    /// the caller only.
    pub fn resolve_credential(
        &self,
        reference: &str,
        expected: SecretKind,
    ) -> Result<Value, NodeError> {
        let resolver = self
            .runtime
            .credentials
            .as_ref()
            .ok_or(CredentialError::NoResolver)?;
        Ok(resolver.resolve(reference, expected)?)
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("node_id", &self.node_id)
            .field("namespace", &self.namespace)
            .field("run_id", &self.run_id)
            .finish()
    }
}
