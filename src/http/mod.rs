//! HTTP/WS surface: the four routes named in the external interface.
//!
//! `GET /ws/terminal`, `POST /api/llm/log`, `GET
//! /api/llm/conversations/:tab_id`, `GET /api/health`. Nothing else is
//! served by this core — no static assets, no self-update, no UI.

use crate::broker::{Broker, UpgradeQuery};
use crate::detect::{self, CommandKind, Provider};
use crate::health::HealthMonitor;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    broker: Broker,
    health: Arc<HealthMonitor>,
}

/// Build the complete router for this core's HTTP/WS surface.
#[must_use]
pub fn build_router(broker: Broker, health: Arc<HealthMonitor>) -> Router {
    let state = AppState { broker, health };
    Router::new()
        .route("/ws/terminal", get(ws_terminal))
        .route("/api/llm/log", post(llm_log))
        .route("/api/llm/conversations/{tab_id}", get(llm_conversations))
        .route("/api/health", get(health_snapshot))
        .with_state(state)
}

async fn ws_terminal(ws: WebSocketUpgrade, Query(query): Query<UpgradeQuery>, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        state.broker.handle_connection(socket, query).await;
    })
}

/// Body of the LLM log trigger endpoint.
#[derive(Debug, Deserialize)]
struct LlmLogRequest {
    #[serde(rename = "tabId")]
    tab_id: String,
    content: String,
    #[serde(rename = "triggerAM")]
    trigger_am: bool,
    #[serde(rename = "llmProvider")]
    llm_provider: Option<String>,
    #[serde(default, rename = "llmType")]
    llm_type: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct LlmLogResponse {
    success: bool,
    #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,
}

async fn llm_log(State(state): State<AppState>, Json(body): Json<LlmLogRequest>) -> impl IntoResponse {
    // Appending to the per-tab markdown session log is outside this core's
    // scope (spec.md §1); only the AM-trigger path is implemented here.
    if !body.trigger_am {
        return Json(LlmLogResponse { success: true, conversation_id: None });
    }

    let provider = body
        .llm_provider
        .as_deref()
        .map(Provider::parse)
        .unwrap_or_else(|| detect::keyword_match(&body.content));
    let kind = match body.llm_type.as_deref() {
        Some("suggest") => CommandKind::Suggest,
        Some("explain") => CommandKind::Explain,
        Some("code") => CommandKind::Code,
        _ => CommandKind::Chat,
    };
    let prompt = body.description.clone().unwrap_or_default();

    let engine = state.broker.engines().engine_for(&body.tab_id);
    let conversation_id = engine.start_conversation_explicit(provider, kind, prompt, body.content);

    Json(LlmLogResponse { success: true, conversation_id: Some(conversation_id) })
}

#[derive(Debug, Serialize)]
struct ConversationsResponse {
    success: bool,
    count: usize,
    conversations: Vec<crate::store::model::ConversationSummary>,
}

async fn llm_conversations(State(state): State<AppState>, Path(tab_id): Path<String>) -> impl IntoResponse {
    let summaries = state.broker.engines().list_conversations(&tab_id);
    Json(ConversationsResponse {
        success: true,
        count: summaries.len(),
        conversations: summaries,
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    layers: Vec<LayerStatusDto>,
    metrics: HealthMetricsDto,
}

#[derive(Debug, Serialize)]
struct LayerStatusDto {
    #[serde(rename = "layerId")]
    layer_id: u8,
    name: &'static str,
    status: String,
    #[serde(rename = "secondsSinceHeartbeat", skip_serializing_if = "Option::is_none")]
    seconds_since_heartbeat: Option<u64>,
    #[serde(rename = "eventCount")]
    event_count: u64,
}

#[derive(Debug, Serialize)]
struct HealthMetricsDto {
    #[serde(rename = "totalEvents")]
    total_events: u64,
    #[serde(rename = "activeConversations")]
    active_conversations: u64,
    #[serde(rename = "conversationsStarted")]
    conversations_started: u64,
    #[serde(rename = "conversationsCompleted")]
    conversations_completed: u64,
    #[serde(rename = "uptimeSecs")]
    uptime_secs: u64,
    #[serde(rename = "conversationsValidated")]
    conversations_validated: u64,
    #[serde(rename = "conversationsCorrupted")]
    conversations_corrupted: u64,
    #[serde(rename = "lastValidationTime", skip_serializing_if = "Option::is_none")]
    last_validation_time: Option<DateTime<Utc>>,
    #[serde(rename = "layersOperational")]
    layers_operational: u64,
    #[serde(rename = "layersTotal")]
    layers_total: u64,
}

async fn health_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    let layers = state
        .health
        .layer_snapshot()
        .into_iter()
        .map(|l| LayerStatusDto {
            layer_id: l.layer_id,
            name: l.name,
            status: l.status.to_string(),
            seconds_since_heartbeat: l.seconds_since_heartbeat,
            event_count: l.event_count,
        })
        .collect();
    let m = state.health.metrics();
    let response = HealthResponse {
        status: state.health.overall_status().to_string(),
        layers,
        metrics: HealthMetricsDto {
            total_events: m.total_events,
            active_conversations: m.active_conversations,
            conversations_started: m.conversations_started,
            conversations_completed: m.conversations_completed,
            uptime_secs: m.uptime_secs,
            conversations_validated: m.conversations_validated,
            conversations_corrupted: m.conversations_corrupted,
            last_validation_time: m.last_validation_time,
            layers_operational: m.layers_operational,
            layers_total: m.layers_total,
        },
    };
    (StatusCode::OK, Json(response))
}
