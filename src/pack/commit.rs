// SPDX-License-Identifier: MIT

//! Commit records and live items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::namespace::{Namespace, NamespacePattern};

/// What a commit did to its key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitAction {
    Write,
    Quarantine,
}

/// Identity attributed to a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Writer {
    pub id: String,
    pub name: String,
}

impl Writer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Writer used by call sites outside any node (seeding, tooling)
    pub fn external() -> Self {
        Self::new("external", "external")
    }
}

/// Immutable, ordered record of one state mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// 1-based position in the pack's log
    pub sequence: u64,
    pub action: CommitAction,
    pub key: String,
    pub namespace: Namespace,
    pub writer_id: String,
    pub writer_name: String,
    /// Version of the key after this commit
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<u64>,
    pub timestamp: DateTime<Utc>,
    /// Written value, kept so snapshots can be rebuilt by replay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Why the key was quarantined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Commit {
    pub fn is_quarantine(&self) -> bool {
        self.action == CommitAction::Quarantine
    }
}

/// Metadata attached to a live item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub namespace: Namespace,
    pub writer_id: String,
    pub writer_name: String,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
}

/// Current value of a key within a namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub key: String,
    pub value: Value,
    pub metadata: ItemMetadata,
}

impl StoredItem {
    /// Live item produced by a write commit
    pub(crate) fn from_commit(commit: &Commit) -> Option<Self> {
        let value = commit.value.clone()?;
        Some(Self {
            key: commit.key.clone(),
            value,
            metadata: ItemMetadata {
                namespace: commit.namespace.clone(),
                writer_id: commit.writer_id.clone(),
                writer_name: commit.writer_name.clone(),
                version: commit.version,
                timestamp: commit.timestamp,
            },
        })
    }
}

/// Selects commits from the history
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub key: Option<String>,
    pub namespace: Option<NamespacePattern>,
    pub action: Option<CommitAction>,
}

impl HistoryFilter {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn in_namespace(mut self, pattern: NamespacePattern) -> Self {
        self.namespace = Some(pattern);
        self
    }

    pub fn with_action(mut self, action: CommitAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn matches(&self, commit: &Commit) -> bool {
        self.key.as_ref().map_or(true, |k| k == &commit.key)
            && self
                .namespace
                .as_ref()
                .map_or(true, |p| p.matches(&commit.namespace))
            && self.action.map_or(true, |a| a == commit.action)
    }
}
