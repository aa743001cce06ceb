// SPDX-License-Identifier: MIT

//! packflow: a versioned state pack with a label-routed flow engine
//!
//! Nodes read and write an append-only, namespaced store through access
//! patterns; every write is an attributed commit that can be replayed into
//! snapshots and diffed. Flows nest under derived namespaces and report
//! their lifecycle on a synchronous event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod flow;
pub mod pack;

pub use config::RuntimeConfig;
pub use error::{
    CredentialError, FlowError, NodeError, PackError, PackflowError, ValidationError,
};
pub use events::{EventBus, EventKind, FlowEvent};
pub use flow::{Flow, FlowOutcome, FlowRuntime, Node, NodeContext, NodeRegistry};
pub use pack::{AccessPattern, Commit, Namespace, NamespacePattern, Snapshot, StatePack, Writer};
