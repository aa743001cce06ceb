// SPDX-License-Identifier: MIT

//! Lifecycle event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::pack::namespace::Namespace;

/// Phase transitions observable on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    NodeStart,
    PrepComplete,
    ExecComplete,
    NodeEnd,
    Error,
    /// Announced by the pack after each commit is applied
    StateCommit,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NodeStart => "NODE_START",
            EventKind::PrepComplete => "PREP_COMPLETE",
            EventKind::ExecComplete => "EXEC_COMPLETE",
            EventKind::NodeEnd => "NODE_END",
            EventKind::Error => "ERROR",
            EventKind::StateCommit => "STATE_COMMIT",
        }
    }
}

/// One emitted event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEvent {
    pub kind: EventKind,
    pub namespace: Namespace,
    pub node_id: String,
    pub node_name: String,
    /// Set for events emitted during a flow run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
}

impl FlowEvent {
    pub fn new(
        kind: EventKind,
        namespace: Namespace,
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            kind,
            namespace,
            node_id: node_id.into(),
            node_name: node_name.into(),
            run_id: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}
