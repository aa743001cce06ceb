// SPDX-License-Identifier: MIT

//! Flow execution engine
//!
//! This module provides:
//! - `Node` / `NodeContext` - the phase trait and per-invocation store access
//! - `Flow` - label-routed, namespace-composing executor
//! - `GraphDescription` / `NodeRegistry` / `load_structure` - export and rebuild
//! - contract, credential and metadata hooks for collaborators

pub mod contract;
pub mod credentials;
pub mod engine;
pub mod graph;
pub mod loader;
pub mod metadata;
pub mod node;
pub mod nodes;
pub mod registry;
mod runtime;

pub use contract::{Contract, ContractSet, ContractValidator, NodeContracts, SchemaValidator};
pub use credentials::{CredentialResolver, EnvCredentialResolver, SecretKind};
pub use engine::{Flow, FlowOutcome};
pub use graph::{EdgeDescription, GraphDescription, NodeDescription};
pub use loader::{load_structure, GraphLoader};
pub use metadata::{
    infer_metadata, infer_node_metadata, MetadataOverrides, NodeMetadata, PortMetadata,
};
pub use node::{Node, NodeContext, Phase, COMPLETE, ERROR};
pub use nodes::{SetNode, SubflowNode, TemplateNode};
pub use registry::{NodeFactory, NodeRegistry, NodeSpec};
pub use runtime::FlowRuntime;
