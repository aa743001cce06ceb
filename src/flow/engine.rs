// SPDX-License-Identifier: MIT

//! Flow executor
//!
//! A flow owns nodes and label-keyed routing edges. `run` drives one node at
//! a time through prepare, compute and finalize, then follows the edge named
//! by the returned label until no edge matches.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use super::graph::{EdgeDescription, GraphDescription, NodeDescription};
use super::node::{Node, NodeContext, Phase, ERROR};
use super::runtime::FlowRuntime;
use crate::error::{FlowError, NodeError};
use crate::events::{EventKind, FlowEvent};
use crate::pack::{CommitAction, HistoryFilter, Namespace};

/// A node placed in a flow
struct NodeEntry {
    node: Box<dyn Node>,
    namespace: Namespace,
}

/// Result of a flow that ran until no edge matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowOutcome {
    pub run_id: Uuid,
    pub last_node: String,
    pub last_label: String,
    pub steps: usize,
    /// Node ids in invocation order
    pub path: Vec<String>,
}

/// Sequential, label-routed node graph bound to a namespace
pub struct Flow {
    namespace: Namespace,
    runtime: FlowRuntime,
    nodes: HashMap<String, NodeEntry>,
    node_order: Vec<String>, // Insertion order for deterministic export
    edges: BTreeMap<(String, String), String>,
    entry: Option<String>,
}

impl Flow {
    pub fn new(namespace: Namespace, runtime: FlowRuntime) -> Self {
        Self {
            namespace,
            runtime,
            nodes: HashMap::new(),
            node_order: Vec::new(),
            edges: BTreeMap::new(),
            entry: None,
        }
    }

    pub fn add_node<N: Node + 'static>(&mut self, node: N) -> Result<(), FlowError> {
        self.add_boxed(Box::new(node))
    }

    /// Adopt a node at `flow_namespace.<id>`. The first node added becomes
    /// the entry unless `set_entry` says otherwise.
    pub fn add_boxed(&mut self, mut node: Box<dyn Node>) -> Result<(), FlowError> {
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            return Err(FlowError::DuplicateNode(id));
        }

        let namespace = self.namespace.child(&id)?;
        node.attach(&self.runtime, &namespace)?;
        log::debug!("Node '{}' ({}) placed at '{}'", id, node.kind(), namespace);

        if self.entry.is_none() {
            self.entry = Some(id.clone());
        }
        self.node_order.push(id.clone());
        self.nodes.insert(id, NodeEntry { node, namespace });
        Ok(())
    }

    /// Route `label` returned by `from` to `to`
    pub fn connect(&mut self, from: &str, label: &str, to: &str) -> Result<(), FlowError> {
        for id in [from, to] {
            if !self.nodes.contains_key(id) {
                return Err(FlowError::UnknownNode(id.to_string()));
            }
        }
        if label.is_empty() {
            return Err(FlowError::Routing(format!(
                "empty label on edge from '{}'",
                from
            )));
        }

        let key = (from.to_string(), label.to_string());
        if let Some(existing) = self.edges.get(&key) {
            return Err(FlowError::Routing(format!(
                "'{}' already routes '{}' to '{}'",
                from, label, existing
            )));
        }
        self.edges.insert(key, to.to_string());
        Ok(())
    }

    pub fn set_entry(&mut self, id: &str) -> Result<(), FlowError> {
        if !self.nodes.contains_key(id) {
            return Err(FlowError::UnknownNode(id.to_string()));
        }
        self.entry = Some(id.to_string());
        Ok(())
    }

    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn runtime(&self) -> &FlowRuntime {
        &self.runtime
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.node_order.iter().map(String::as_str)
    }

    pub fn node(&self, id: &str) -> Option<&dyn Node> {
        self.nodes.get(id).map(|e| e.node.as_ref())
    }

    pub fn node_namespace(&self, id: &str) -> Option<&Namespace> {
        self.nodes.get(id).map(|e| &e.namespace)
    }

    /// Routing edges as `(from, label, to)`, sorted
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.edges
            .iter()
            .map(|((from, label), to)| (from.as_str(), label.as_str(), to.as_str()))
    }

    /// Move the flow under `namespace` and share `runtime`, recomputing
    /// every node namespace (nested flows included).
    pub fn rebind(&mut self, runtime: &FlowRuntime, namespace: &Namespace) -> Result<(), FlowError> {
        self.runtime = runtime.clone();
        self.namespace = namespace.clone();
        for (id, entry) in self.nodes.iter_mut() {
            entry.namespace = namespace.child(id)?;
            entry.node.attach(runtime, &entry.namespace)?;
        }
        Ok(())
    }

    /// Run from the entry node
    pub async fn run(&self) -> Result<FlowOutcome, FlowError> {
        let entry = self
            .entry
            .clone()
            .ok_or_else(|| FlowError::Routing("flow has no entry node".to_string()))?;
        self.run_from(&entry).await
    }

    /// Run starting at `start`
    pub async fn run_from(&self, start: &str) -> Result<FlowOutcome, FlowError> {
        if !self.nodes.contains_key(start) {
            return Err(FlowError::UnknownNode(start.to_string()));
        }

        let run_id = Uuid::new_v4();
        let max_steps = self.runtime.max_steps;
        log::info!(
            "Flow '{}' run {} starting at '{}'",
            self.namespace,
            run_id,
            start
        );

        let mut current = start.to_string();
        let mut path = Vec::new();

        loop {
            if path.len() >= max_steps {
                log::error!(
                    "Flow '{}' run {} exceeded {} steps",
                    self.namespace,
                    run_id,
                    max_steps
                );
                return Err(FlowError::StepLimitExceeded(max_steps));
            }

            let entry = self
                .nodes
                .get(&current)
                .ok_or_else(|| FlowError::UnknownNode(current.clone()))?;
            path.push(current.clone());

            let label = match self.invoke(entry, run_id, path.len()).await {
                Ok(label) => label,
                Err((phase, source)) => {
                    if let Some(target) = self.route(&current, ERROR) {
                        log::warn!(
                            "Node '{}' failed during {}: {}; routing to '{}'",
                            entry.namespace,
                            phase,
                            source,
                            target
                        );
                        current = target.to_string();
                        continue;
                    }
                    log::error!(
                        "Node '{}' failed during {}: {}",
                        entry.namespace,
                        phase,
                        source
                    );
                    return Err(FlowError::Node {
                        namespace: entry.namespace.to_string(),
                        node_id: current,
                        phase,
                        source,
                    });
                }
            };

            match self.route(&current, &label) {
                Some(target) => current = target.to_string(),
                None => {
                    log::info!(
                        "Flow '{}' run {} finished at '{}' with '{}' after {} steps",
                        self.namespace,
                        run_id,
                        current,
                        label,
                        path.len()
                    );
                    return Ok(FlowOutcome {
                        run_id,
                        last_node: current,
                        last_label: label,
                        steps: path.len(),
                        path,
                    });
                }
            }
        }
    }

    fn route(&self, from: &str, label: &str) -> Option<&str> {
        self.edges
            .get(&(from.to_string(), label.to_string()))
            .map(String::as_str)
    }

    /// Drive one node through its phases, returning the routing label or the
    /// failed phase
    async fn invoke(
        &self,
        entry: &NodeEntry,
        run_id: Uuid,
        step: usize,
    ) -> Result<String, (Phase, NodeError)> {
        let node = entry.node.as_ref();
        let ctx = NodeContext::for_node(
            node,
            entry.namespace.clone(),
            self.namespace.clone(),
            self.runtime.clone(),
            run_id,
        );
        let started = Instant::now();

        log::info!("Executing node: {}", entry.namespace);
        self.emit(
            entry,
            run_id,
            EventKind::NodeStart,
            json!({"run_id": run_id, "step": step}),
        );

        let prepared = node
            .prepare(&ctx)
            .await
            .map_err(|e| self.fail(entry, run_id, Phase::Prepare, e))?;
        self.emit(entry, run_id, EventKind::PrepComplete, prepared.clone());

        let output = node
            .compute(&ctx, &prepared)
            .await
            .map_err(|e| self.fail(entry, run_id, Phase::Compute, e))?;
        self.emit(entry, run_id, EventKind::ExecComplete, output.clone());

        let before_finalize = self.runtime.pack.latest_sequence();
        let label = match node.finalize(&ctx, &prepared, &output).await {
            Ok(label) => label,
            Err(e) => {
                self.quarantine_partial_writes(&ctx, before_finalize, &e);
                return Err(self.fail(entry, run_id, Phase::Finalize, e));
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.emit(
            entry,
            run_id,
            EventKind::NodeEnd,
            json!({"label": label, "elapsed_ms": elapsed_ms}),
        );
        log::debug!(
            "Node {} completed with '{}' in {}ms",
            entry.namespace,
            label,
            elapsed_ms
        );
        Ok(label)
    }

    /// Quarantine every key the node wrote after `since` that is still live
    fn quarantine_partial_writes(&self, ctx: &NodeContext, since: u64, error: &NodeError) {
        let pack = &self.runtime.pack;
        let writer = ctx.writer();
        let reason = format!("finalize failed: {}", error);
        let filter = HistoryFilter::default().with_action(CommitAction::Write);

        let mut seen = HashSet::new();
        for commit in pack.history(Some(&filter)) {
            if commit.sequence <= since || commit.writer_id != writer.id {
                continue;
            }
            if !seen.insert((commit.key.clone(), commit.namespace.clone()))
                || pack.is_quarantined(&commit.key, &commit.namespace)
            {
                continue;
            }
            match pack.quarantine(&commit.key, &commit.namespace, &writer, &reason) {
                Ok(_) => log::warn!(
                    "Quarantined partial write '{}' in '{}'",
                    commit.key,
                    commit.namespace
                ),
                Err(e) => log::error!(
                    "Could not quarantine '{}' in '{}': {}",
                    commit.key,
                    commit.namespace,
                    e
                ),
            }
        }
    }

    fn fail(
        &self,
        entry: &NodeEntry,
        run_id: Uuid,
        phase: Phase,
        error: NodeError,
    ) -> (Phase, NodeError) {
        self.emit(
            entry,
            run_id,
            EventKind::Error,
            json!({"phase": phase, "error": error.to_string()}),
        );
        (phase, error)
    }

    fn emit(&self, entry: &NodeEntry, run_id: Uuid, kind: EventKind, payload: Value) {
        self.runtime.bus.emit(
            FlowEvent::new(
                kind,
                entry.namespace.clone(),
                entry.node.id(),
                entry.node.name(),
                payload,
            )
            .with_run_id(run_id),
        );
    }

    /// Serializable description of nodes, edges and nested flows
    pub fn export_structure(&self) -> GraphDescription {
        let nodes = self
            .node_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|entry| NodeDescription {
                id: entry.node.id().to_string(),
                name: Some(entry.node.name().to_string()),
                kind: entry.node.kind().to_string(),
                params: entry.node.params(),
                subflow: entry
                    .node
                    .subflow()
                    .map(|flow| Box::new(flow.export_structure())),
            })
            .collect();

        let edges = self
            .edges()
            .map(|(from, label, to)| EdgeDescription {
                from: from.to_string(),
                label: label.to_string(),
                to: to.to_string(),
            })
            .collect();

        GraphDescription {
            namespace: self.namespace.clone(),
            entry: self.entry.clone(),
            nodes,
            edges,
        }
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("namespace", &self.namespace)
            .field("nodes", &self.node_order)
            .field("entry", &self.entry)
            .field("edges", &self.edges.len())
            .finish()
    }
}
