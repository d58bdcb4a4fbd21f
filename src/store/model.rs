//! Conversation data model, persisted verbatim to disk.

use crate::detect::{CommandKind, Provider};
use serde::{Deserialize, Serialize};

/// One `(role, content, timestamp, provider)` entry inside a conversation.
/// `content` is always sanitized text; raw bytes never reach the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn.
    pub role: Role,
    /// Sanitized text content.
    pub content: String,
    /// When the turn was recorded.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Provider active when the turn was recorded.
    pub provider: String,
}

/// Turn role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text the user sent to the PTY.
    User,
    /// Text the assistant/provider produced.
    Assistant,
}

/// One recorded LLM interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Monotonically unique, time-derived identifier within the process.
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    /// Tab this conversation belongs to.
    #[serde(rename = "tabId")]
    pub tab_id: String,
    /// Recognized provider, or `"unknown"`.
    pub provider: String,
    /// Command kind, e.g. `"chat"`.
    #[serde(rename = "commandType")]
    pub command_type: String,
    /// RFC 3339 start time.
    #[serde(rename = "startTime")]
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// RFC 3339 end time, set when the conversation completes.
    #[serde(rename = "endTime")]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Ordered, append-only list of turns.
    pub turns: Vec<Turn>,
    /// Set once the conversation has been explicitly ended or the session closed.
    pub complete: bool,
    /// Whether this conversation was captured while the pty was in TUI mode.
    #[serde(rename = "tuiCaptureMode")]
    pub tui_capture_mode: bool,

    /// Fields from a future schema version this build doesn't recognize.
    /// Preserved verbatim on read-modify-write.
    #[serde(flatten)]
    pub unknown_fields: serde_json::Map<String, serde_json::Value>,
}

impl Conversation {
    /// Start a new, empty-but-for-its-first-turn conversation.
    #[must_use]
    pub fn new(
        conversation_id: impl Into<String>,
        tab_id: impl Into<String>,
        provider: Provider,
        kind: CommandKind,
        first_user_turn: String,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            tab_id: tab_id.into(),
            provider: provider.as_str().to_string(),
            command_type: kind.as_str().to_string(),
            start_time: now,
            end_time: None,
            turns: vec![Turn {
                role: Role::User,
                content: first_user_turn,
                timestamp: now,
                provider: provider.as_str().to_string(),
            }],
            complete: false,
            tui_capture_mode: false,
            unknown_fields: serde_json::Map::new(),
        }
    }

    /// File name this conversation is stored under.
    #[must_use]
    pub fn file_name(tab_id: &str, conversation_id: &str) -> String {
        format!("llm-conv-{tab_id}-{conversation_id}.json")
    }
}

/// Lightweight listing entry returned by `ListForTab`.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    /// Conversation identifier.
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    /// Provider.
    pub provider: String,
    /// Start time.
    #[serde(rename = "startTime")]
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// Whether the conversation is complete.
    pub complete: bool,
    /// Number of turns recorded.
    #[serde(rename = "turnCount")]
    pub turn_count: usize,
}

impl From<&Conversation> for ConversationSummary {
    fn from(c: &Conversation) -> Self {
        Self {
            conversation_id: c.conversation_id.clone(),
            provider: c.provider.clone(),
            start_time: c.start_time,
            complete: c.complete,
            turn_count: c.turns.len(),
        }
    }
}
