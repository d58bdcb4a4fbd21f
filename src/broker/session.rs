//! One live WebSocket-to-PTY session.
//!
//! Owns exactly one PTY handle and drives it from three cooperating
//! tasks: a blocking output pump (PTY reads are OS-blocking), an async
//! flush ticker, and the calling task's own input loop. All three share
//! the session's `Arc<dyn PtyHandle>` and `Arc<TabEngine>`.

use crate::broker::protocol::{ControlMessage, UpgradeQuery};
use crate::broker::SessionRegistry;
use crate::bus::{Event, EventBus, EventType};
use crate::engine::{EngineRegistry, TabEngine};
use crate::error::CloseReason;
use crate::pty::{OpenParams, PtyAdapter, PtyHandle};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const BUS_LAYER_BROKER: u8 = 1;
const OUTPUT_CHUNK_SIZE: usize = 4096;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const FLUSH_CHECK_INTERVAL: Duration = Duration::from_secs(2);
const INPUT_BUFFER_CAP: usize = 64 * 1024;

/// Messages the blocking output pump forwards to the async session loop.
enum PumpEvent {
    Bytes(Vec<u8>),
    Done(CloseReason),
}

/// Drive one session end to end: open the pty, spawn the pump and
/// heartbeat/flush tickers, run the input loop inline, and tear down
/// cleanly on any exit path.
pub async fn run_session(
    mut ws: WebSocket,
    query: UpgradeQuery,
    pty_adapter: Arc<dyn PtyAdapter>,
    engines: Arc<EngineRegistry>,
    bus: EventBus,
    session_hard_cap: Duration,
    flush_inactivity: Duration,
    sessions: SessionRegistry,
) {
    let tab_id = query.tab_id.clone();
    let cwd = query.home.clone().unwrap_or_else(|| ".".to_string());

    let params = OpenParams {
        shell: query.shell_kind(),
        distro: query.distro.clone(),
        cwd,
        env: HashMap::new(),
        cols: 80,
        rows: 24,
    };

    let pty = match pty_adapter.open(&params) {
        Ok(handle) => handle,
        Err(e) => {
            log::warn!("pty open failed for tab {tab_id}: {e}");
            let _ = ws
                .send(Message::Close(Some(CloseFrame {
                    code: CloseReason::PtyIoError.code(),
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };

    let engine = engines.engine_for(&tab_id);
    let session_key = sessions.register(tab_id.clone(), engine.clone(), pty.clone());
    bus.publish(Event::new(EventType::SessionStart, BUS_LAYER_BROKER).with_tab(tab_id.clone()));

    let (pump_tx, mut pump_rx) = mpsc::unbounded_channel::<PumpEvent>();
    let pump_pty = pty.clone();
    let pump_engine = engine.clone();
    tokio::task::spawn_blocking(move || output_pump(&*pump_pty, &pump_engine, &pump_tx));

    let flush_pty = pty.clone();
    let flush_engine = engine.clone();
    let flush_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(FLUSH_CHECK_INTERVAL);
        loop {
            interval.tick().await;
            if flush_pty.is_done() {
                break;
            }
            if flush_engine.should_flush_output(flush_inactivity) {
                flush_engine.flush_output();
            }
        }
    });

    let heartbeat_bus = bus.clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            heartbeat_bus.publish(Event::new(EventType::Heartbeat, BUS_LAYER_BROKER));
        }
    });

    let mut input_buffer: Vec<u8> = Vec::new();
    let hard_cap = tokio::time::sleep(session_hard_cap);
    tokio::pin!(hard_cap);

    let close_reason = loop {
        tokio::select! {
            biased;

            () = &mut hard_cap => {
                break CloseReason::SessionTimeout;
            }

            pump_event = pump_rx.recv() => {
                match pump_event {
                    Some(PumpEvent::Bytes(data)) => {
                        if ws.send(Message::Binary(data.into())).await.is_err() {
                            break CloseReason::PtyIoError;
                        }
                    }
                    Some(PumpEvent::Done(reason)) => break reason,
                    None => break CloseReason::PtyIoError,
                }
            }

            incoming = ws.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_frame(text.as_str(), &pty);
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        handle_input_bytes(bytes.as_ref(), &pty, &mut input_buffer, &engine);
                    }
                    Some(Ok(Message::Close(_))) => break CloseReason::Normal,
                    Some(Ok(_)) => {} // Ping/Pong handled by axum
                    Some(Err(e)) => {
                        log::warn!("ws recv error for tab {tab_id}: {e}");
                        break CloseReason::PtyIoError;
                    }
                    None => break CloseReason::Normal,
                }
            }
        }
    };

    heartbeat_handle.abort();
    flush_handle.abort();
    sessions.unregister(session_key);
    engine.end_active_conversation("session_close");
    pty.close();
    bus.publish(
        Event::new(EventType::SessionEnd, BUS_LAYER_BROKER)
            .with_tab(tab_id.clone())
            .with_payload(format!("{:?}", close_reason)),
    );

    let _ = ws
        .send(Message::Close(Some(CloseFrame {
            code: close_reason.code(),
            reason: "".into(),
        })))
        .await;
}

/// Try to parse a text frame as control JSON (currently only `resize`).
/// Unrecognized or malformed control text is ignored: only binary frames
/// and detected resize requests are meaningful on this channel.
fn handle_text_frame(text: &str, pty: &Arc<dyn PtyHandle>) {
    match serde_json::from_str::<ControlMessage>(text) {
        Ok(ControlMessage::Resize { cols, rows }) => {
            if let Err(e) = pty.resize(cols, rows) {
                log::warn!("resize failed: {e}");
            }
        }
        Err(e) => log::debug!("ignoring malformed control frame: {e}"),
    }
}

/// Append bytes to the bounded input-tokenization buffer, write the raw
/// bytes straight through to the pty regardless of detection outcome, and
/// offer each complete line in the consumed prefix to the detector
/// individually, so a pasted multi-command frame doesn't collapse into one
/// undetectable blob.
fn handle_input_bytes(
    bytes: &[u8],
    pty: &Arc<dyn PtyHandle>,
    input_buffer: &mut Vec<u8>,
    engine: &Arc<TabEngine>,
) {
    if let Err(e) = pty.write(bytes) {
        log::warn!("pty write failed: {e}");
    }

    input_buffer.extend_from_slice(bytes);
    if input_buffer.len() > INPUT_BUFFER_CAP {
        log::warn!("input buffer exceeded {INPUT_BUFFER_CAP} bytes, resetting");
        input_buffer.clear();
        return;
    }

    if let Some(last_newline) = input_buffer.iter().rposition(|&b| b == b'\n' || b == b'\r') {
        let consumed = input_buffer[..=last_newline].to_vec();
        input_buffer.drain(..=last_newline);

        for line in consumed.split(|&b| b == b'\n' || b == b'\r') {
            let line = String::from_utf8_lossy(line);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let detected = crate::detect::detect(trimmed);
            if detected.detected {
                engine.start_conversation(&detected);
            }
        }
    }
}

/// Blocking loop: read PTY output, forward to the session task, feed the
/// engine's output buffer. Runs on a dedicated blocking thread because
/// `PtyHandle::read` is OS-blocking.
fn output_pump(pty: &dyn PtyHandle, engine: &Arc<TabEngine>, tx: &mpsc::UnboundedSender<PumpEvent>) {
    let mut buf = [0u8; OUTPUT_CHUNK_SIZE];
    loop {
        match pty.read(&mut buf) {
            Ok(0) => {
                if pty.is_done() {
                    let _ = tx.send(PumpEvent::Done(CloseReason::PtyExited));
                    return;
                }
                // No data but child still alive; a backend that returns
                // 0 without data (rather than blocking) would otherwise
                // spin, so treat as exited to be safe.
                let _ = tx.send(PumpEvent::Done(CloseReason::PtyExited));
                return;
            }
            Ok(n) => {
                let data = buf[..n].to_vec();
                engine.add_output(&data);
                if tx.send(PumpEvent::Bytes(data)).is_err() {
                    return;
                }
            }
            Err(e) => {
                log::warn!("pty read error: {e}");
                let _ = tx.send(PumpEvent::Done(CloseReason::PtyIoError));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty::fake::FakePty;

    #[test]
    fn handle_input_bytes_writes_through_regardless_of_detection() {
        let (handle, state) = FakePty::open_with_state();
        let pty: Arc<dyn PtyHandle> = Arc::new(handle);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::store::ConversationStore::new(dir.path().to_path_buf()).unwrap());
        let registry = EngineRegistry::new(store, EventBus::new());
        let engine = registry.engine_for("T1");
        let mut buf = Vec::new();

        handle_input_bytes(b"ls -la\n", &pty, &mut buf, &engine);

        assert_eq!(state.lock().unwrap().written, b"ls -la\n");
        assert!(buf.is_empty()); // consumed by the newline
        assert!(engine.active_conversation_id().is_none()); // not a recognized command
    }

    #[test]
    fn handle_input_bytes_detects_a_recognized_line() {
        let (handle, _state) = FakePty::open_with_state();
        let pty: Arc<dyn PtyHandle> = Arc::new(handle);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::store::ConversationStore::new(dir.path().to_path_buf()).unwrap());
        let registry = EngineRegistry::new(store, EventBus::new());
        let engine = registry.engine_for("T1");
        let mut buf = Vec::new();

        handle_input_bytes(b"copilot\n", &pty, &mut buf, &engine);

        assert!(engine.active_conversation_id().is_some());
    }

    #[test]
    fn handle_input_bytes_detects_every_line_in_a_pasted_multiline_frame() {
        let (handle, _state) = FakePty::open_with_state();
        let pty: Arc<dyn PtyHandle> = Arc::new(handle);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::store::ConversationStore::new(dir.path().to_path_buf()).unwrap());
        let registry = EngineRegistry::new(store, EventBus::new());
        let engine = registry.engine_for("T1");
        let mut buf = Vec::new();

        handle_input_bytes(b"ls\ncopilot\n", &pty, &mut buf, &engine);

        assert!(buf.is_empty());
        assert!(engine.active_conversation_id().is_some());
    }

    #[test]
    fn handle_input_bytes_buffers_partial_lines() {
        let (handle, state) = FakePty::open_with_state();
        let pty: Arc<dyn PtyHandle> = Arc::new(handle);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::store::ConversationStore::new(dir.path().to_path_buf()).unwrap());
        let registry = EngineRegistry::new(store, EventBus::new());
        let engine = registry.engine_for("T1");
        let mut buf = Vec::new();

        handle_input_bytes(b"cop", &pty, &mut buf, &engine);
        assert_eq!(buf, b"cop");
        handle_input_bytes(b"ilot\n", &pty, &mut buf, &engine);

        assert_eq!(state.lock().unwrap().written, b"ilot\n");
        assert!(engine.active_conversation_id().is_some());
    }

    #[test]
    fn handle_input_bytes_resets_on_overflow() {
        let (handle, _state) = FakePty::open_with_state();
        let pty: Arc<dyn PtyHandle> = Arc::new(handle);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::store::ConversationStore::new(dir.path().to_path_buf()).unwrap());
        let registry = EngineRegistry::new(store, EventBus::new());
        let engine = registry.engine_for("T1");
        let mut buf = vec![b'x'; INPUT_BUFFER_CAP + 1];

        handle_input_bytes(b"y", &pty, &mut buf, &engine);
        assert!(buf.is_empty());
    }

    #[test]
    fn output_pump_forwards_bytes_and_reports_exit() {
        let (handle, state) = FakePty::open_with_state();
        state.lock().unwrap().pending_output.extend(b"hello".iter().copied());
        state.lock().unwrap().exited = false;
        let pty: Arc<dyn PtyHandle> = Arc::new(handle);
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::store::ConversationStore::new(dir.path().to_path_buf()).unwrap());
        let registry = EngineRegistry::new(store, EventBus::new());
        let engine = registry.engine_for("T1");
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Mark exited so the pump's second (empty) read reports PtyExited
        // instead of looping forever in this synchronous test.
        state.lock().unwrap().exited = true;
        output_pump(&*pty, &engine, &tx);

        let first = rx.try_recv().unwrap();
        match first {
            PumpEvent::Bytes(b) => assert_eq!(b, b"hello"),
            PumpEvent::Done(_) => panic!("expected bytes first"),
        }
        let second = rx.try_recv().unwrap();
        assert!(matches!(second, PumpEvent::Done(CloseReason::PtyExited)));
    }
}
