//! Single-process publish/subscribe event bus.
//!
//! Every cross-layer signal in the core — heartbeats, session lifecycle,
//! LLM start/end, filesystem activity — flows through one `EventBus`
//! instance constructed at startup and handed explicitly to the Broker and
//! Health Monitor (no global singleton; test harnesses build their own
//! bus and subscribe fakes to it).
//!
//! Delivery is synchronous within the publisher's call to `publish`:
//! handlers run in registration order, in the publisher's own thread.
//! Ordering is therefore per-publisher FIFO only — there is no promise
//! about interleaving between two concurrent publishers. Handlers must not
//! block and must not call `publish` again with events derived from the
//! one they're handling; the bus does not detect or prevent reentrant
//! loops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// The five logical layers tracked by the health monitor, and the bus
/// events they emit.
pub type LayerId = u8;

/// Recognized event types, per the observability wire contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// Periodic liveness signal from a layer.
    Heartbeat,
    /// A new session was accepted.
    SessionStart,
    /// A session was torn down.
    SessionEnd,
    /// A conversation was started.
    LlmStart,
    /// A conversation was ended.
    LlmEnd,
    /// Filesystem activity under the AM directory.
    FileEvent,
    /// A periodic process-table scan completed.
    ProcessScan,
}

/// One event on the bus.
#[derive(Debug, Clone)]
pub struct Event {
    /// The kind of event.
    pub event_type: EventType,
    /// Which layer (1..5) produced this event.
    pub layer: LayerId,
    /// Tab the event pertains to, if any.
    pub tab_id: Option<String>,
    /// Conversation the event pertains to, if any.
    pub conversation_id: Option<String>,
    /// Provider the event pertains to, if any.
    pub provider: Option<String>,
    /// Wall-clock time the event was published.
    pub timestamp: SystemTime,
    /// Freeform payload, e.g. a close reason or error message.
    pub payload: Option<String>,
}

impl Event {
    /// Construct an event with only the required fields set.
    #[must_use]
    pub fn new(event_type: EventType, layer: LayerId) -> Self {
        Self {
            event_type,
            layer,
            tab_id: None,
            conversation_id: None,
            provider: None,
            timestamp: SystemTime::now(),
            payload: None,
        }
    }

    /// Attach a tab id.
    #[must_use]
    pub fn with_tab(mut self, tab_id: impl Into<String>) -> Self {
        self.tab_id = Some(tab_id.into());
        self
    }

    /// Attach a freeform payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// A handler registered via `subscribe`. Boxed so the bus can hold a
/// heterogeneous list of closures and trait-object handlers alike.
type Handler = Box<dyn Fn(&Event) + Send + Sync>;

/// An opaque handle returned by `subscribe`; drop it or call `unsubscribe`
/// to stop receiving events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    handler: Handler,
}

/// The bus itself. Cheap to clone (internally `Arc`-backed); every
/// component that needs to publish or subscribe holds a clone.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.subscribers.lock().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("EventBus").field("subscribers", &count).finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Construct an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a handler. Returns a handle that can later be passed to
    /// `unsubscribe`.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subs = self.subscribers.lock().expect("event bus lock poisoned");
        subs.push(Subscriber {
            id,
            handler: Box::new(handler),
        });
        id
    }

    /// Remove a previously registered handler. No-op if already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscribers.lock().expect("event bus lock poisoned");
        subs.retain(|s| s.id != id);
    }

    /// Deliver `event` to every current subscriber, in registration order,
    /// synchronously on the calling thread.
    pub fn publish(&self, event: Event) {
        let subs = self.subscribers.lock().expect("event bus lock poisoned");
        for sub in subs.iter() {
            (sub.handler)(&event);
        }
    }
}
