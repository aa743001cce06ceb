// SPDX-License-Identifier: MIT

//! Synchronous publish/subscribe bus
//!
//! `emit` copies the subscriber list, releases the lock and then calls every
//! matching handler in subscription order before returning. The bus
//! guarantees dispatch order only: a handler that spawns work owns the
//! completion of that work.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::types::FlowEvent;
use crate::pack::namespace::NamespacePattern;

/// Callback invoked for every matching event
pub type EventHandler = Arc<dyn Fn(&FlowEvent) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    pattern: NamespacePattern,
    handler: EventHandler,
}

struct BusInner {
    subscribers: RwLock<Vec<Arc<Subscription>>>,
    history: Mutex<VecDeque<FlowEvent>>,
    history_capacity: usize,
    next_id: AtomicU64,
}

/// Cloneable handle; all clones share subscribers and history
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Bus without a history buffer
    pub fn new() -> Self {
        Self::with_history(0)
    }

    /// Bus retaining the last `capacity` events (0 disables the buffer)
    pub fn with_history(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Vec::new()),
                history: Mutex::new(VecDeque::with_capacity(capacity)),
                history_capacity: capacity,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `handler` for events whose namespace matches `pattern`
    pub fn subscribe<F>(&self, pattern: NamespacePattern, handler: F) -> SubscriptionId
    where
        F: Fn(&FlowEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Arc::new(Subscription {
            id,
            pattern,
            handler: Arc::new(handler),
        });
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscription);
        id
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Dispatch `event` to every matching subscriber, in order
    pub fn emit(&self, event: FlowEvent) {
        self.record(&event);

        let snapshot: Vec<Arc<Subscription>> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut dispatched = 0usize;
        for subscription in snapshot
            .iter()
            .filter(|s| s.pattern.matches(&event.namespace))
        {
            (subscription.handler)(&event);
            dispatched += 1;
        }

        log::debug!(
            "Emitted {} for '{}' to {} subscriber(s)",
            event.kind.as_str(),
            event.namespace,
            dispatched
        );
    }

    fn record(&self, event: &FlowEvent) {
        if self.inner.history_capacity == 0 {
            return;
        }
        let mut history = self
            .inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if history.len() == self.inner.history_capacity {
            history.pop_front();
        }
        history.push_back(event.clone());
    }

    /// Buffered events, oldest first, optionally filtered by namespace
    pub fn history(&self, pattern: Option<&NamespacePattern>) -> Vec<FlowEvent> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pattern.map_or(true, |p| p.matches(&e.namespace)))
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn history_capacity(&self) -> usize {
        self.inner.history_capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("history_capacity", &self.inner.history_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::pack::namespace::Namespace;
    use serde_json::json;

    fn event(kind: EventKind, ns: &str) -> FlowEvent {
        FlowEvent::new(kind, Namespace::new(ns).unwrap(), "n", "N", json!(null))
    }

    fn pat(s: &str) -> NamespacePattern {
        NamespacePattern::parse(s).unwrap()
    }

    #[test]
    fn test_emit_reaches_matching_subscribers_only() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        bus.subscribe(pat("demo.*"), move |e| {
            sink.lock().unwrap().push(e.namespace.to_string())
        });

        bus.emit(event(EventKind::NodeStart, "demo.greet"));
        bus.emit(event(EventKind::NodeStart, "other.greet"));
        bus.emit(event(EventKind::NodeStart, "demo.greet.inner"));

        assert_eq!(*seen.lock().unwrap(), vec!["demo.greet".to_string()]);
    }

    #[test]
    fn test_dispatch_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let sink = order.clone();
            bus.subscribe(NamespacePattern::any(), move |_| sink.lock().unwrap().push(i));
        }

        bus.emit(event(EventKind::NodeEnd, "a"));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));

        let c = count.clone();
        let id = bus.subscribe(NamespacePattern::any(), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(event(EventKind::NodeStart, "a"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(event(EventKind::NodeStart, "a"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscribe_during_dispatch() {
        let bus = EventBus::new();
        let late_calls = Arc::new(AtomicU64::new(0));

        let bus_clone = bus.clone();
        let late = late_calls.clone();
        bus.subscribe(NamespacePattern::any(), move |_| {
            let late = late.clone();
            bus_clone.subscribe(NamespacePattern::any(), move |_| {
                late.fetch_add(1, Ordering::SeqCst);
            });
        });

        // The subscriber added mid-dispatch only sees later events
        bus.emit(event(EventKind::NodeStart, "a"));
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(event(EventKind::NodeStart, "a"));
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_during_dispatch() {
        let bus = EventBus::new();
        let target: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let victim_calls = Arc::new(AtomicU64::new(0));

        let bus_clone = bus.clone();
        let pending = target.clone();
        bus.subscribe(NamespacePattern::any(), move |_| {
            if let Some(id) = pending.lock().unwrap().take() {
                assert!(bus_clone.unsubscribe(id));
            }
        });
        let calls = victim_calls.clone();
        let victim = bus.subscribe(NamespacePattern::any(), move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        *target.lock().unwrap() = Some(victim);

        // Removed mid-dispatch, it still gets the event in flight
        bus.emit(event(EventKind::NodeStart, "a"));
        assert_eq!(victim_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(event(EventKind::NodeEnd, "a"));
        assert_eq!(victim_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let bus = EventBus::with_history(2);
        bus.emit(event(EventKind::NodeStart, "a"));
        bus.emit(event(EventKind::PrepComplete, "a"));
        bus.emit(event(EventKind::ExecComplete, "b"));

        let kinds: Vec<_> = bus.history(None).iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::PrepComplete, EventKind::ExecComplete]);

        let only_b = bus.history(Some(&pat("b")));
        assert_eq!(only_b.len(), 1);

        bus.clear_history();
        assert!(bus.history(None).is_empty());
    }

    #[test]
    fn test_history_disabled_by_default() {
        let bus = EventBus::new();
        bus.emit(event(EventKind::NodeStart, "a"));
        assert!(bus.history(None).is_empty());
    }
}
