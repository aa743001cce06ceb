// SPDX-License-Identifier: MIT

//! Point-in-time projections and structural diffs

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::commit::{Commit, CommitAction, StoredItem};
use super::namespace::Namespace;

/// Address of an item: namespace plus key
pub type ItemKey = (Namespace, String);

/// Live view built by applying commits in order
#[derive(Debug, Clone, Default)]
pub(crate) struct Projection {
    items: BTreeMap<ItemKey, StoredItem>,
    versions: HashMap<ItemKey, u64>,
    quarantined: HashSet<ItemKey>,
}

impl Projection {
    pub fn replay<'a>(commits: impl IntoIterator<Item = &'a Commit>) -> Self {
        let mut projection = Self::default();
        for commit in commits {
            projection.apply(commit);
        }
        projection
    }

    pub fn apply(&mut self, commit: &Commit) {
        let address = (commit.namespace.clone(), commit.key.clone());
        self.versions.insert(address.clone(), commit.version);
        match commit.action {
            CommitAction::Write => {
                self.quarantined.remove(&address);
                if let Some(item) = StoredItem::from_commit(commit) {
                    self.items.insert(address, item);
                }
            }
            CommitAction::Quarantine => {
                self.items.remove(&address);
                self.quarantined.insert(address);
            }
        }
    }

    pub fn version(&self, namespace: &Namespace, key: &str) -> Option<u64> {
        self.versions.get(&(namespace.clone(), key.to_string())).copied()
    }

    pub fn get(&self, namespace: &Namespace, key: &str) -> Option<&StoredItem> {
        self.items.get(&(namespace.clone(), key.to_string()))
    }

    pub fn is_quarantined(&self, namespace: &Namespace, key: &str) -> bool {
        self.quarantined
            .contains(&(namespace.clone(), key.to_string()))
    }

    pub fn into_snapshot(self, at_sequence: u64) -> Snapshot {
        Snapshot {
            at_sequence,
            items: self.items,
        }
    }
}

/// All live items as of one commit sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    at_sequence: u64,
    items: BTreeMap<ItemKey, StoredItem>,
}

impl Snapshot {
    /// Sequence of the last commit included (0 = empty pack)
    pub fn at_sequence(&self) -> u64 {
        self.at_sequence
    }

    pub fn get(&self, namespace: &Namespace, key: &str) -> Option<&StoredItem> {
        self.items.get(&(namespace.clone(), key.to_string()))
    }

    pub fn value(&self, namespace: &Namespace, key: &str) -> Option<&Value> {
        self.get(namespace, key).map(|item| &item.value)
    }

    pub fn items(&self) -> impl Iterator<Item = &StoredItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Nested `{namespace: {key: value}}` object
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for ((namespace, key), item) in &self.items {
            let entry = root
                .entry(namespace.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(keys) = entry {
                keys.insert(key.clone(), item.value.clone());
            }
        }
        Value::Object(root)
    }

    /// Structural comparison from `self` (before) to `other` (after)
    pub fn diff(&self, other: &Snapshot) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();

        for ((namespace, key), after) in &other.items {
            match self.items.get(&(namespace.clone(), key.clone())) {
                None => diff.added.push(DiffEntry {
                    namespace: namespace.clone(),
                    key: key.clone(),
                    value: after.value.clone(),
                }),
                Some(before) if before.value != after.value => diff.changed.push(ChangedEntry {
                    namespace: namespace.clone(),
                    key: key.clone(),
                    before: before.value.clone(),
                    after: after.value.clone(),
                }),
                Some(_) => {}
            }
        }

        for ((namespace, key), before) in &self.items {
            if !other.items.contains_key(&(namespace.clone(), key.clone())) {
                diff.removed.push(DiffEntry {
                    namespace: namespace.clone(),
                    key: key.clone(),
                    value: before.value.clone(),
                });
            }
        }

        diff
    }
}

/// Key present on one side of a diff
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
}

/// Key whose value differs between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangedEntry {
    pub namespace: Namespace,
    pub key: String,
    pub before: Value,
    pub after: Value,
}

/// Result of comparing two snapshots; entries sorted by (namespace, key)
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SnapshotDiff {
    pub added: Vec<DiffEntry>,
    pub changed: Vec<ChangedEntry>,
    pub removed: Vec<DiffEntry>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}
