//! Per-tab LLM conversation state machine.
//!
//! One `TabEngine` per `tabId`, created lazily and kept in the top-level
//! `EngineRegistry`. All mutable state for a tab lives behind one mutex,
//! mirroring the single-entity-guarded-state shape used for live sessions
//! elsewhere in this crate: a top-level map keyed by id, each entry its
//! own independently lockable struct.

use crate::bus::{Event, EventBus, EventType};
use crate::detect::{CommandKind, Detected, Provider};
use crate::error::StoreError;
use crate::sanitize::sanitize;
use crate::store::model::{Conversation, ConversationSummary, Role, Turn};
use crate::store::ConversationStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const BUS_LAYER_ENGINE: u8 = 2;

struct TabState {
    active_conversation_id: Option<String>,
    conversations: HashMap<String, Conversation>,
    output_buffer: Vec<u8>,
    last_output_at: Option<Instant>,
}

impl TabState {
    fn new() -> Self {
        Self {
            active_conversation_id: None,
            conversations: HashMap::new(),
            output_buffer: Vec::new(),
            last_output_at: None,
        }
    }
}

/// Monotonic, time-derived conversation id generator. Collisions are
/// avoided by pairing the millisecond timestamp with a per-process counter.
fn next_conversation_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{millis:x}-{seq:x}")
}

/// One tab's conversation engine: tracks the active conversation, buffers
/// assistant output, and writes through the store. All operations are
/// reactive; there is no background timer here, matching the spec's
/// explicit "the Engine is purely reactive" contract — the Broker decides
/// when to poll `should_flush_output`.
pub struct TabEngine {
    tab_id: String,
    state: Mutex<TabState>,
    store: Arc<ConversationStore>,
    bus: EventBus,
}

impl TabEngine {
    fn new(tab_id: String, store: Arc<ConversationStore>, bus: EventBus) -> Self {
        Self {
            tab_id,
            state: Mutex::new(TabState::new()),
            store,
            bus,
        }
    }

    /// Start a new conversation, closing any existing active one first.
    /// Saves synchronously before returning: `Load` is guaranteed to
    /// succeed immediately afterward.
    pub fn start_conversation(&self, detected: &Detected) -> String {
        self.close_active_if_any("implicit_restart");

        let conversation_id = next_conversation_id();
        let prompt = sanitize(detected.prompt.as_bytes());
        let conversation = Conversation::new(
            conversation_id.clone(),
            self.tab_id.clone(),
            detected.provider,
            detected.kind,
            prompt,
        );

        if let Err(e) = self.store.save(&conversation) {
            log::error!("failed to save new conversation {conversation_id}: {e}");
        }

        {
            let mut state = self.state.lock().expect("engine state lock poisoned");
            state.conversations.insert(conversation_id.clone(), conversation);
            state.active_conversation_id = Some(conversation_id.clone());
            state.output_buffer.clear();
            state.last_output_at = None;
        }

        self.bus.publish(
            Event::new(EventType::LlmStart, BUS_LAYER_ENGINE)
                .with_tab(self.tab_id.clone())
                .with_payload(detected.provider.as_str()),
        );

        conversation_id
    }

    /// Start a conversation from an explicit HTTP trigger rather than
    /// stream detection, per the log-trigger endpoint semantics.
    pub fn start_conversation_explicit(
        &self,
        provider: Provider,
        kind: CommandKind,
        prompt: String,
        raw_input: String,
    ) -> String {
        let detected = Detected {
            provider,
            kind,
            prompt,
            raw_input,
            detected: true,
        };
        self.start_conversation(&detected)
    }

    /// Append a sanitized `user` turn to the active conversation. Dropped
    /// silently if there is no active conversation.
    pub fn add_input(&self, text: &str) {
        let mut state = self.state.lock().expect("engine state lock poisoned");
        let Some(conv_id) = state.active_conversation_id.clone() else {
            return;
        };
        let provider = state
            .conversations
            .get(&conv_id)
            .map(|c| c.provider.clone())
            .unwrap_or_else(|| Provider::Unknown.as_str().to_string());
        if let Some(conv) = state.conversations.get_mut(&conv_id) {
            conv.turns.push(Turn {
                role: Role::User,
                content: sanitize(text.as_bytes()),
                timestamp: chrono::Utc::now(),
                provider,
            });
        }
        drop(state);
        self.save_conversation(&conv_id);
    }

    /// Accumulate raw output bytes. Does not itself decide to flush.
    pub fn add_output(&self, raw: &[u8]) {
        let mut state = self.state.lock().expect("engine state lock poisoned");
        if state.active_conversation_id.is_none() {
            return;
        }
        state.output_buffer.extend_from_slice(raw);
        state.last_output_at = Some(Instant::now());
    }

    /// Pure predicate: is there buffered output older than `inactivity`?
    pub fn should_flush_output(&self, inactivity: Duration) -> bool {
        let state = self.state.lock().expect("engine state lock poisoned");
        match state.last_output_at {
            Some(t) => !state.output_buffer.is_empty() && t.elapsed() >= inactivity,
            None => false,
        }
    }

    /// Sanitize and append the buffered output as one `assistant` turn,
    /// then clear the buffer. Idempotent on an empty buffer.
    pub fn flush_output(&self) {
        let (conv_id, cleaned, provider) = {
            let mut state = self.state.lock().expect("engine state lock poisoned");
            let Some(conv_id) = state.active_conversation_id.clone() else {
                return;
            };
            if state.output_buffer.is_empty() {
                return;
            }
            let cleaned = sanitize(&state.output_buffer);
            state.output_buffer.clear();
            let provider = state
                .conversations
                .get(&conv_id)
                .map(|c| c.provider.clone())
                .unwrap_or_else(|| Provider::Unknown.as_str().to_string());
            (conv_id, cleaned, provider)
        };

        if cleaned.is_empty() {
            return;
        }

        {
            let mut state = self.state.lock().expect("engine state lock poisoned");
            if let Some(conv) = state.conversations.get_mut(&conv_id) {
                conv.turns.push(Turn {
                    role: Role::Assistant,
                    content: cleaned,
                    timestamp: chrono::Utc::now(),
                    provider,
                });
            }
        }
        self.save_conversation(&conv_id);
    }

    /// Flush, mark complete, publish `LLM_END`, save, and clear the active
    /// conversation pointer.
    pub fn end_active_conversation(&self, reason: &str) {
        self.flush_output();
        self.close_active_if_any(reason);
    }

    fn close_active_if_any(&self, reason: &str) {
        let conv_id = {
            let mut state = self.state.lock().expect("engine state lock poisoned");
            let Some(conv_id) = state.active_conversation_id.take() else {
                return;
            };
            if let Some(conv) = state.conversations.get_mut(&conv_id) {
                conv.complete = true;
                conv.end_time = Some(chrono::Utc::now());
            }
            conv_id
        };
        self.save_conversation(&conv_id);
        self.bus.publish(
            Event::new(EventType::LlmEnd, BUS_LAYER_ENGINE)
                .with_tab(self.tab_id.clone())
                .with_payload(reason),
        );
    }

    fn save_conversation(&self, conv_id: &str) {
        let snapshot = {
            let state = self.state.lock().expect("engine state lock poisoned");
            state.conversations.get(conv_id).cloned()
        };
        if let Some(conv) = snapshot {
            if let Err(e) = self.store.save(&conv) {
                log::error!("failed to save conversation {conv_id}: {e}");
            }
        }
    }

    /// Current active conversation id, if any.
    pub fn active_conversation_id(&self) -> Option<String> {
        self.state.lock().expect("engine state lock poisoned").active_conversation_id.clone()
    }

    /// Look up a conversation by id from in-memory state (falls back to
    /// the store for conversations not touched this process lifetime).
    pub fn load_conversation(&self, conv_id: &str) -> Result<Conversation, StoreError> {
        if let Some(conv) = self.state.lock().expect("engine state lock poisoned").conversations.get(conv_id) {
            return Ok(conv.clone());
        }
        self.store.load(&self.tab_id, conv_id)
    }
}

/// Top-level holder of one `TabEngine` per tab, lazily created on first
/// use. Constructed once at process startup and passed explicitly to the
/// Broker and HTTP handlers — no global singleton.
pub struct EngineRegistry {
    store: Arc<ConversationStore>,
    bus: EventBus,
    engines: Mutex<HashMap<String, Arc<TabEngine>>>,
}

impl EngineRegistry {
    /// Construct a registry backed by `store`, publishing lifecycle events
    /// to `bus`.
    #[must_use]
    pub fn new(store: Arc<ConversationStore>, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Get or lazily create the engine for `tab_id`.
    pub fn engine_for(&self, tab_id: &str) -> Arc<TabEngine> {
        let mut engines = self.engines.lock().expect("engine registry lock poisoned");
        engines
            .entry(tab_id.to_string())
            .or_insert_with(|| {
                Arc::new(TabEngine::new(tab_id.to_string(), self.store.clone(), self.bus.clone()))
            })
            .clone()
    }

    /// List conversations on disk for `tab_id`, read directly from the
    /// store so a tab that never instantiated an in-process engine (e.g.
    /// after a restart) still shows its history.
    #[must_use]
    pub fn list_conversations(&self, tab_id: &str) -> Vec<ConversationSummary> {
        self.store.list_for_tab(tab_id)
    }

    /// Count tabs with an active conversation right now, for the Health
    /// Monitor's `activeConversations` metric.
    #[must_use]
    pub fn active_conversation_count(&self) -> u64 {
        let engines = self.engines.lock().expect("engine registry lock poisoned");
        engines.values().filter(|e| e.active_conversation_id().is_some()).count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> EngineRegistry {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(ConversationStore::new(dir.path().to_path_buf()).expect("store"));
        std::mem::forget(dir); // keep the tempdir alive for the test's duration
        EngineRegistry::new(store, EventBus::new())
    }

    fn detected(prompt: &str) -> Detected {
        Detected {
            provider: Provider::Claude,
            kind: CommandKind::Chat,
            prompt: prompt.to_string(),
            raw_input: format!("claude {prompt}"),
            detected: true,
        }
    }

    #[test]
    fn start_conversation_is_durable_immediately() {
        let registry = test_registry();
        let engine = registry.engine_for("T1");
        let conv_id = engine.start_conversation(&detected("hello"));

        let loaded = engine.store.load("T1", &conv_id).expect("load after start");
        assert_eq!(loaded.turns.len(), 1);
        assert_eq!(loaded.turns[0].role, Role::User);
        assert_eq!(loaded.turns[0].content, "hello");
        assert!(!loaded.complete);
    }

    #[test]
    fn starting_a_second_conversation_closes_the_first() {
        let registry = test_registry();
        let engine = registry.engine_for("T1");
        let first = engine.start_conversation(&detected("one"));
        let second = engine.start_conversation(&detected("two"));

        assert_ne!(first, second);
        let first_on_disk = engine.store.load("T1", &first).unwrap();
        assert!(first_on_disk.complete);
        assert_eq!(engine.active_conversation_id(), Some(second));
    }

    #[test]
    fn add_input_without_active_conversation_is_dropped() {
        let registry = test_registry();
        let engine = registry.engine_for("T1");
        engine.add_input("ignored");
        assert!(engine.active_conversation_id().is_none());
    }

    #[test]
    fn flush_output_appends_assistant_turn_and_clears_buffer() {
        let registry = test_registry();
        let engine = registry.engine_for("T1");
        let conv_id = engine.start_conversation(&detected("hi"));

        engine.add_output(b"\x1b[31mresponse text\x1b[0m");
        assert!(engine.should_flush_output(Duration::from_secs(0)));
        engine.flush_output();

        let loaded = engine.store.load("T1", &conv_id).unwrap();
        assert_eq!(loaded.turns.len(), 2);
        assert_eq!(loaded.turns[1].role, Role::Assistant);
        assert_eq!(loaded.turns[1].content, "response text");

        // Idempotent on an empty buffer.
        engine.flush_output();
        let loaded_again = engine.store.load("T1", &conv_id).unwrap();
        assert_eq!(loaded_again.turns.len(), 2);
    }

    #[test]
    fn should_flush_output_is_false_before_inactivity_window() {
        let registry = test_registry();
        let engine = registry.engine_for("T1");
        engine.start_conversation(&detected("hi"));
        engine.add_output(b"partial");
        assert!(!engine.should_flush_output(Duration::from_secs(60)));
    }

    #[test]
    fn end_active_conversation_flushes_and_marks_complete() {
        let registry = test_registry();
        let engine = registry.engine_for("T1");
        let conv_id = engine.start_conversation(&detected("hi"));
        engine.add_output(b"final output");

        engine.end_active_conversation("session_close");

        let loaded = engine.store.load("T1", &conv_id).unwrap();
        assert!(loaded.complete);
        assert!(loaded.end_time.is_some());
        assert_eq!(loaded.turns.len(), 2);
        assert!(engine.active_conversation_id().is_none());
    }

    #[test]
    fn active_conversation_count_reflects_only_tabs_with_an_open_conversation() {
        let registry = test_registry();
        assert_eq!(registry.active_conversation_count(), 0);

        let t1 = registry.engine_for("T1");
        t1.start_conversation(&detected("one"));
        let t2 = registry.engine_for("T2");
        t2.start_conversation(&detected("two"));
        assert_eq!(registry.active_conversation_count(), 2);

        t1.end_active_conversation("session_close");
        assert_eq!(registry.active_conversation_count(), 1);
    }

    #[test]
    fn registry_reuses_the_same_engine_for_a_tab() {
        let registry = test_registry();
        let a = registry.engine_for("T1");
        a.start_conversation(&detected("hi"));
        let b = registry.engine_for("T1");
        assert_eq!(b.active_conversation_id(), a.active_conversation_id());
    }
}
