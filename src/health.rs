//! Multi-layer health model.
//!
//! Subscribes to the event bus on construction; every event refreshes the
//! heartbeat for its layer. A periodic `perform_health_check` (driven by
//! the caller, typically a 5s `tokio::time::interval` in `main`) demotes
//! layers that have gone quiet past their deadlines. `UNKNOWN` layers are
//! never touched by the timeout path — only an explicit event promotes
//! them to `HEALTHY`.

use crate::bus::{EventBus, LayerId};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Per-layer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    /// No event has ever been observed for this layer.
    Unknown,
    /// Heartbeats are within the alert threshold.
    Healthy,
    /// No heartbeat for more than one alert threshold.
    Degraded,
    /// No heartbeat for more than two alert thresholds.
    Failed,
}

impl std::fmt::Display for LayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Aggregate system status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStatus {
    /// No non-self, non-unknown layer is healthy.
    Critical,
    /// Exactly one non-self, non-unknown layer is healthy.
    Degraded,
    /// Some but not all relevant layers are healthy.
    Warning,
    /// All relevant layers are healthy (or none are tracked yet).
    Healthy,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Critical => "CRITICAL",
            Self::Degraded => "DEGRADED",
            Self::Warning => "WARNING",
            Self::Healthy => "HEALTHY",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of one layer's status, as surfaced via the health endpoint.
#[derive(Debug, Clone)]
pub struct LayerStatus {
    /// 1..5.
    pub layer_id: LayerId,
    /// Human-readable layer name.
    pub name: &'static str,
    /// Current state.
    pub status: LayerState,
    /// Seconds since the last heartbeat, if any has ever been observed.
    pub seconds_since_heartbeat: Option<u64>,
    /// Total events observed for this layer.
    pub event_count: u64,
}

/// Aggregate counters, surfaced alongside the per-layer snapshot.
#[derive(Debug, Clone, Default)]
pub struct HealthMetrics {
    /// Total bus events observed across all layers.
    pub total_events: u64,
    /// Conversations currently active across all tabs.
    pub active_conversations: u64,
    /// Conversations started since process start.
    pub conversations_started: u64,
    /// Conversations completed since process start.
    pub conversations_completed: u64,
    /// Seconds since process start.
    pub uptime_secs: u64,
    /// Files that validated successfully on the last store scan.
    pub conversations_validated: u64,
    /// Files that failed to parse on the last store scan.
    pub conversations_corrupted: u64,
    /// When the last store validation scan completed, if one has run yet.
    pub last_validation_time: Option<DateTime<Utc>>,
    /// Non-self, non-UNKNOWN layers currently `HEALTHY`.
    pub layers_operational: u64,
    /// Non-self, non-UNKNOWN layers total.
    pub layers_total: u64,
}

const LAYER_NAMES: [(LayerId, &str); 5] = [
    (1, "pty_interceptor"),
    (2, "shell_hooks"),
    (3, "process_monitor"),
    (4, "fs_watcher"),
    (5, "health_monitor"),
];

const SELF_LAYER: LayerId = 5;

struct LayerEntry {
    name: &'static str,
    status: LayerState,
    last_heartbeat: Option<Instant>,
    event_count: u64,
}

struct Inner {
    layers: [LayerEntry; 5],
    total_events: u64,
    active_conversations: u64,
    conversations_started: u64,
    conversations_completed: u64,
    conversations_validated: u64,
    conversations_corrupted: u64,
    last_validation_time: Option<DateTime<Utc>>,
}

/// The health monitor itself.
pub struct HealthMonitor {
    inner: Mutex<Inner>,
    alert_threshold: Duration,
    started_at: Instant,
}

impl HealthMonitor {
    /// Construct a monitor and subscribe it to `bus`. All five layers
    /// start `UNKNOWN`.
    #[must_use]
    pub fn new(bus: &EventBus, alert_threshold: Duration) -> Arc<Self> {
        let monitor = Arc::new(Self {
            inner: Mutex::new(Inner {
                layers: LAYER_NAMES.map(|(_, name)| LayerEntry {
                    name,
                    status: LayerState::Unknown,
                    last_heartbeat: None,
                    event_count: 0,
                }),
                total_events: 0,
                active_conversations: 0,
                conversations_started: 0,
                conversations_completed: 0,
                conversations_validated: 0,
                conversations_corrupted: 0,
                last_validation_time: None,
            }),
            alert_threshold,
            started_at: Instant::now(),
        });

        let observed = monitor.clone();
        bus.subscribe(move |event| observed.on_event(event));

        monitor
    }

    fn on_event(&self, event: &crate::bus::Event) {
        use crate::bus::EventType;
        let mut inner = self.inner.lock().expect("health monitor lock poisoned");
        inner.total_events += 1;
        match event.event_type {
            EventType::LlmStart => inner.conversations_started += 1,
            EventType::LlmEnd => inner.conversations_completed += 1,
            _ => {}
        }

        let layer_idx = (event.layer.saturating_sub(1)) as usize;
        if let Some(entry) = inner.layers.get_mut(layer_idx) {
            entry.last_heartbeat = Some(Instant::now());
            entry.event_count += 1;
            if entry.status == LayerState::Unknown {
                entry.status = LayerState::Healthy;
            }
        }
    }

    /// Record a change in the number of currently active conversations.
    pub fn set_active_conversations(&self, count: u64) {
        self.inner.lock().expect("health monitor lock poisoned").active_conversations = count;
    }

    /// Record the result of the store's startup/periodic validation scan.
    pub fn record_validation(&self, validated: u64, corrupted: u64) {
        let mut inner = self.inner.lock().expect("health monitor lock poisoned");
        inner.conversations_validated = validated;
        inner.conversations_corrupted = corrupted;
        inner.last_validation_time = Some(Utc::now());
    }

    /// Demote layers whose heartbeat has exceeded the alert threshold (or
    /// twice it). `UNKNOWN` layers are left untouched — only events
    /// promote them.
    pub fn perform_health_check(&self) {
        let mut inner = self.inner.lock().expect("health monitor lock poisoned");
        for (idx, (layer_id, _)) in LAYER_NAMES.iter().enumerate() {
            if *layer_id == SELF_LAYER {
                continue;
            }
            let entry = &mut inner.layers[idx];
            let Some(last) = entry.last_heartbeat else {
                continue; // UNKNOWN, never timed out
            };
            let elapsed = last.elapsed();
            if entry.status == LayerState::Healthy && elapsed > self.alert_threshold {
                entry.status = LayerState::Degraded;
                log::warn!("layer {layer_id} ({}) degraded: no heartbeat for {elapsed:?}", entry.name);
            } else if entry.status == LayerState::Degraded && elapsed > self.alert_threshold * 2 {
                entry.status = LayerState::Failed;
                log::error!("layer {layer_id} ({}) failed: no heartbeat for {elapsed:?}", entry.name);
            }
        }
    }

    /// Count of non-self, non-UNKNOWN layers that are `HEALTHY`, and the
    /// total count of non-self, non-UNKNOWN layers. Shared by
    /// `overall_status` and `metrics` so both report the same numbers.
    fn relevant_layer_counts(inner: &Inner) -> (u64, u64) {
        let relevant = inner
            .layers
            .iter()
            .enumerate()
            .filter(|(idx, _)| LAYER_NAMES[*idx].0 != SELF_LAYER)
            .map(|(_, e)| e)
            .filter(|e| e.status != LayerState::Unknown);

        let mut total_relevant = 0u64;
        let mut operational = 0u64;
        for entry in relevant {
            total_relevant += 1;
            if entry.status == LayerState::Healthy {
                operational += 1;
            }
        }
        (operational, total_relevant)
    }

    /// Compute the aggregate status from current per-layer state.
    #[must_use]
    pub fn overall_status(&self) -> OverallStatus {
        let inner = self.inner.lock().expect("health monitor lock poisoned");
        let (operational, total_relevant) = Self::relevant_layer_counts(&inner);

        match (operational, total_relevant) {
            (0, _) => OverallStatus::Critical,
            (1, _) => OverallStatus::Degraded,
            (op, total) if op < total => OverallStatus::Warning,
            _ => OverallStatus::Healthy,
        }
    }

    /// Snapshot every layer's current status.
    #[must_use]
    pub fn layer_snapshot(&self) -> Vec<LayerStatus> {
        let inner = self.inner.lock().expect("health monitor lock poisoned");
        LAYER_NAMES
            .iter()
            .enumerate()
            .map(|(idx, (layer_id, _))| {
                let entry = &inner.layers[idx];
                LayerStatus {
                    layer_id: *layer_id,
                    name: entry.name,
                    status: entry.status,
                    seconds_since_heartbeat: entry.last_heartbeat.map(|t| t.elapsed().as_secs()),
                    event_count: entry.event_count,
                }
            })
            .collect()
    }

    /// Snapshot aggregate metrics.
    #[must_use]
    pub fn metrics(&self) -> HealthMetrics {
        let inner = self.inner.lock().expect("health monitor lock poisoned");
        let (layers_operational, layers_total) = Self::relevant_layer_counts(&inner);
        HealthMetrics {
            total_events: inner.total_events,
            active_conversations: inner.active_conversations,
            conversations_started: inner.conversations_started,
            conversations_completed: inner.conversations_completed,
            uptime_secs: self.started_at.elapsed().as_secs(),
            conversations_validated: inner.conversations_validated,
            conversations_corrupted: inner.conversations_corrupted,
            last_validation_time: inner.last_validation_time,
            layers_operational,
            layers_total,
        }
    }
}
