//! Session Broker (C8): the concurrency hub gluing WebSocket transport,
//! the PTY adapter, and the per-tab conversation engine together.

pub mod protocol;
pub mod session;

use crate::bus::{Event, EventBus, EventType};
use crate::config::Config;
use crate::engine::{EngineRegistry, TabEngine};
use crate::pty::{PtyAdapter, PtyHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use protocol::UpgradeQuery;

const BUS_LAYER_BROKER: u8 = 1;

struct LiveSession {
    tab_id: String,
    engine: Arc<TabEngine>,
    pty: Arc<dyn PtyHandle>,
}

/// Tracks every session currently open, so a process shutdown can flush
/// and close each one rather than dropping them mid-flight.
#[derive(Clone)]
struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<u64, LiveSession>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionRegistry {
    fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn register(&self, tab_id: String, engine: Arc<TabEngine>, pty: Arc<dyn PtyHandle>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .insert(id, LiveSession { tab_id, engine, pty });
        id
    }

    fn unregister(&self, id: u64) {
        self.sessions.lock().expect("session registry lock poisoned").remove(&id);
    }

    /// End and close every still-live session, publishing `SESSION_END` for
    /// each. Sessions that finish normally unregister themselves first, so
    /// this only touches sessions still open at the moment of the call.
    fn shutdown_all(&self, bus: &EventBus) {
        let drained: HashMap<u64, LiveSession> =
            std::mem::take(&mut *self.sessions.lock().expect("session registry lock poisoned"));
        for (_, live) in drained {
            live.engine.end_active_conversation("process_shutdown");
            live.pty.close();
            bus.publish(
                Event::new(EventType::SessionEnd, BUS_LAYER_BROKER)
                    .with_tab(live.tab_id)
                    .with_payload("process_shutdown"),
            );
        }
    }
}

/// Shared dependencies every new session needs. Constructed once at
/// startup and cloned cheaply per accepted connection.
#[derive(Clone)]
pub struct Broker {
    pty_adapter: Arc<dyn PtyAdapter>,
    engines: Arc<EngineRegistry>,
    bus: EventBus,
    session_hard_cap: Duration,
    flush_inactivity: Duration,
    sessions: SessionRegistry,
}

impl Broker {
    /// Construct a broker from its dependencies and `Config`'s timing
    /// parameters.
    #[must_use]
    pub fn new(pty_adapter: Arc<dyn PtyAdapter>, engines: Arc<EngineRegistry>, bus: EventBus, config: &Config) -> Self {
        Self {
            pty_adapter,
            engines,
            bus,
            session_hard_cap: Duration::from_secs(config.session_hard_cap_secs),
            flush_inactivity: Duration::from_secs(config.flush_inactivity_secs),
            sessions: SessionRegistry::new(),
        }
    }

    /// Accept one upgraded WebSocket and drive its session to completion.
    /// Returns only once the session has fully torn down.
    pub async fn handle_connection(&self, ws: axum::extract::ws::WebSocket, query: UpgradeQuery) {
        session::run_session(
            ws,
            query,
            self.pty_adapter.clone(),
            self.engines.clone(),
            self.bus.clone(),
            self.session_hard_cap,
            self.flush_inactivity,
            self.sessions.clone(),
        )
        .await;
    }

    /// Publish `SESSION_END` for, flush, and close every session still open
    /// at the time of the call. Intended to run once, on graceful shutdown.
    pub fn shutdown(&self) {
        self.sessions.shutdown_all(&self.bus);
    }

    /// The shared event bus, for wiring the Health Monitor.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The shared engine registry, for wiring the HTTP log-trigger and
    /// conversation-retrieval endpoints.
    #[must_use]
    pub fn engines(&self) -> &Arc<EngineRegistry> {
        &self.engines
    }
}
