// SPDX-License-Identifier: MIT

//! Append-only, namespaced state store
//!
//! Every write appends a `Commit` and updates the live projection; nothing is
//! ever overwritten in history. Snapshots are rebuilt by replaying the log up
//! to a sequence number.

use chrono::Utc;
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::commit::{Commit, CommitAction, HistoryFilter, StoredItem, Writer};
use super::namespace::{AccessPattern, Namespace, Operation};
use super::snapshot::{Projection, Snapshot, SnapshotDiff};
use crate::error::PackError;
use crate::events::{EventBus, EventKind, FlowEvent};

#[derive(Default)]
struct PackState {
    commits: Vec<Commit>,
    projection: Projection,
}

struct PackInner {
    state: RwLock<PackState>,
    bus: Option<EventBus>,
}

/// Cloneable handle to one versioned store; clones share the same log
#[derive(Clone)]
pub struct StatePack {
    inner: Arc<PackInner>,
}

impl StatePack {
    /// Store that announces nothing
    pub fn new() -> Self {
        Self::build(PackState::default(), None)
    }

    /// Store that emits a `STATE_COMMIT` event on `bus` after every commit
    pub fn with_bus(bus: EventBus) -> Self {
        Self::build(PackState::default(), Some(bus))
    }

    fn build(state: PackState, bus: Option<EventBus>) -> Self {
        Self {
            inner: Arc::new(PackInner {
                state: RwLock::new(state),
                bus,
            }),
        }
    }

    /// Rebuild a store from an exported commit log
    pub fn restore(commits: Vec<Commit>, bus: Option<EventBus>) -> Result<Self, PackError> {
        let mut projection = Projection::default();
        for (index, commit) in commits.iter().enumerate() {
            let expected = index as u64 + 1;
            if commit.sequence != expected {
                return Err(PackError::CorruptLog(format!(
                    "expected sequence {}, found {}",
                    expected, commit.sequence
                )));
            }
            let previous = projection.version(&commit.namespace, &commit.key);
            if previous.is_some_and(|v| commit.version <= v) || commit.version == 0 {
                return Err(PackError::CorruptLog(format!(
                    "version {} of '{}' in '{}' does not increase",
                    commit.version, commit.key, commit.namespace
                )));
            }
            if commit.action == CommitAction::Write && commit.value.is_none() {
                return Err(PackError::CorruptLog(format!(
                    "write commit {} carries no value",
                    commit.sequence
                )));
            }
            projection.apply(commit);
        }

        log::debug!("Restored pack from {} commits", commits.len());
        Ok(Self::build(PackState { commits, projection }, bus))
    }

    pub fn bus(&self) -> Option<&EventBus> {
        self.inner.bus.as_ref()
    }

    fn state(&self) -> RwLockReadGuard<'_, PackState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, PackState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a write commit and make `value` the live value for the key
    pub fn write(
        &self,
        key: &str,
        value: Value,
        namespace: &Namespace,
        writer: &Writer,
    ) -> Result<Commit, PackError> {
        validate_key(key)?;
        let commit = self.append(CommitAction::Write, key, namespace, writer, Some(value), None);
        log::debug!(
            "Commit #{} write '{}' in '{}' (v{}) by {}",
            commit.sequence,
            key,
            namespace,
            commit.version,
            writer.id
        );
        self.announce(&commit);
        Ok(commit)
    }

    /// Append a quarantine commit; the key leaves the live projection
    pub fn quarantine(
        &self,
        key: &str,
        namespace: &Namespace,
        writer: &Writer,
        reason: &str,
    ) -> Result<Commit, PackError> {
        validate_key(key)?;
        let commit = self.append(
            CommitAction::Quarantine,
            key,
            namespace,
            writer,
            None,
            Some(reason.to_string()),
        );
        log::debug!(
            "Commit #{} quarantine '{}' in '{}' by {}: {}",
            commit.sequence,
            key,
            namespace,
            writer.id,
            reason
        );
        self.announce(&commit);
        Ok(commit)
    }

    fn append(
        &self,
        action: CommitAction,
        key: &str,
        namespace: &Namespace,
        writer: &Writer,
        value: Option<Value>,
        reason: Option<String>,
    ) -> Commit {
        let mut state = self.state_mut();
        let previous_version = state.projection.version(namespace, key);
        let commit = Commit {
            sequence: state.commits.len() as u64 + 1,
            action,
            key: key.to_string(),
            namespace: namespace.clone(),
            writer_id: writer.id.clone(),
            writer_name: writer.name.clone(),
            version: previous_version.unwrap_or(0) + 1,
            previous_version,
            timestamp: Utc::now(),
            value,
            reason,
        };
        state.projection.apply(&commit);
        state.commits.push(commit.clone());
        commit
    }

    // Called with no lock held so handlers can read the pack.
    fn announce(&self, commit: &Commit) {
        if let Some(bus) = &self.inner.bus {
            bus.emit(FlowEvent::new(
                EventKind::StateCommit,
                commit.namespace.clone(),
                commit.writer_id.clone(),
                commit.writer_name.clone(),
                json!({
                    "sequence": commit.sequence,
                    "action": commit.action,
                    "key": commit.key,
                    "version": commit.version,
                    "previous_version": commit.previous_version,
                    "reason": commit.reason,
                }),
            ));
        }
    }

    /// Latest live value, `None` if never written or quarantined
    pub fn read(
        &self,
        key: &str,
        namespace: &Namespace,
        access: &AccessPattern,
    ) -> Result<Option<Value>, PackError> {
        Ok(self.item(key, namespace, access)?.map(|item| item.value))
    }

    /// Like `read`, but a missing value is `MissingRequiredKey`
    pub fn read_required(
        &self,
        key: &str,
        namespace: &Namespace,
        access: &AccessPattern,
    ) -> Result<Value, PackError> {
        self.read(key, namespace, access)?
            .ok_or_else(|| PackError::MissingRequiredKey {
                key: key.to_string(),
                namespace: namespace.to_string(),
            })
    }

    /// Live item with its metadata
    pub fn item(
        &self,
        key: &str,
        namespace: &Namespace,
        access: &AccessPattern,
    ) -> Result<Option<StoredItem>, PackError> {
        access.check(Operation::Read, namespace)?;
        Ok(self.state().projection.get(namespace, key).cloned())
    }

    /// Whether the latest commit for the key is a quarantine
    pub fn is_quarantined(&self, key: &str, namespace: &Namespace) -> bool {
        self.state().projection.is_quarantined(namespace, key)
    }

    /// Commit log, oldest first
    pub fn history(&self, filter: Option<&HistoryFilter>) -> Vec<Commit> {
        self.state()
            .commits
            .iter()
            .filter(|c| filter.map_or(true, |f| f.matches(c)))
            .cloned()
            .collect()
    }

    pub fn latest_sequence(&self) -> u64 {
        self.state().commits.len() as u64
    }

    /// Projection as it was right after commit `at` (default: latest)
    pub fn snapshot(&self, at: Option<u64>) -> Result<Snapshot, PackError> {
        let state = self.state();
        let latest = state.commits.len() as u64;
        let cutoff = at.unwrap_or(latest);
        if cutoff > latest {
            return Err(PackError::SequenceOutOfRange {
                requested: cutoff,
                latest,
            });
        }
        Ok(Projection::replay(&state.commits[..cutoff as usize]).into_snapshot(cutoff))
    }

    pub fn diff(&self, a: &Snapshot, b: &Snapshot) -> SnapshotDiff {
        a.diff(b)
    }

    /// Full log for an external persistence layer
    pub fn export_log(&self) -> Vec<Commit> {
        self.history(None)
    }
}

fn validate_key(key: &str) -> Result<(), PackError> {
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(PackError::InvalidKey(key.to_string()));
    }
    Ok(())
}

impl Default for StatePack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatePack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatePack")
            .field("commits", &self.latest_sequence())
            .field("bus", &self.inner.bus.is_some())
            .finish()
    }
}
