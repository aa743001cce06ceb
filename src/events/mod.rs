// SPDX-License-Identifier: MIT

//! Lifecycle event bus
//!
//! This module provides:
//! - `EventBus` - synchronous pub/sub keyed by namespace patterns
//! - `FlowEvent` / `EventKind` - the events nodes and the pack emit

mod bus;
mod types;

pub use bus::{EventBus, EventHandler, SubscriptionId};
pub use types::{EventKind, FlowEvent};
