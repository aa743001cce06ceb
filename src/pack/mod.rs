// SPDX-License-Identifier: MIT

//! Versioned state store ("the pack")
//!
//! This module provides:
//! - `StatePack` - append-only, namespaced key/value history
//! - `Commit` / `StoredItem` - log records and live values
//! - `Snapshot` / `SnapshotDiff` - replayed projections and their diffs
//! - `Namespace` / `NamespacePattern` / `AccessPattern` - addressing and access control

mod commit;
pub mod namespace;
mod snapshot;
mod store;

pub use commit::{Commit, CommitAction, HistoryFilter, ItemMetadata, StoredItem, Writer};
pub use namespace::{AccessPattern, Namespace, NamespacePattern, Operation};
pub use snapshot::{ChangedEntry, DiffEntry, ItemKey, Snapshot, SnapshotDiff};
pub use store::StatePack;
