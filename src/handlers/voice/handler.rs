//! WebSocket voice session handler
//!
//! Owns the connection lifecycle: one receive loop for inbound audio and
//! one spawned sender task that serializes everything outbound. All other
//! tasks (the turn pipeline, the idle watcher) talk to the socket only
//! through the sender's channel, so interleaving is decided in exactly
//! one place.

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::audio::rms_energy;
use crate::core::events::{MessageRoute, OutgoingEvent};
use crate::core::session::{cancel_turn_task, cleanup, Session, SharedSession, TurnTask};
use crate::core::state_machine::SessionState;
use crate::core::watcher::watch_idle;
use crate::state::AppState;

const CHANNEL_BUFFER_SIZE: usize = 1024;

pub async fn voice_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_voice_socket(socket, state))
}

async fn handle_voice_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4().to_string()[..8].to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    // Sole writer to the socket
    let sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let outcome = match route {
                MessageRoute::Event(event) => match serde_json::to_string(&event) {
                    Ok(json) => ws_tx.send(Message::Text(Utf8Bytes::from(json))).await,
                    Err(err) => {
                        error!("failed to serialize event: {err}");
                        continue;
                    }
                },
                MessageRoute::Audio(bytes) => ws_tx.send(Message::Binary(bytes)).await,
                MessageRoute::Close => {
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: Utf8Bytes::from("session timeout"),
                        })))
                        .await;
                    break;
                }
            };
            if outcome.is_err() {
                break;
            }
        }
    });

    let session: SharedSession = Arc::new(RwLock::new(Session::new(
        session_id.clone(),
        state.config.turn_detection.clone(),
    )));

    state.sessions.insert(&session_id);
    info!(
        session_id = %session_id,
        active_sessions = state.sessions.len(),
        "voice session connected"
    );

    {
        let watcher = tokio::spawn(watch_idle(
            session.clone(),
            route_tx.clone(),
            state.config.session_timeout,
        ));
        let mut s = session.write().await;
        s.set_timeout_task(watcher);
        s.transition(SessionState::UserSpeaking);
        let _ = route_tx
            .send(MessageRoute::Event(OutgoingEvent::status(s.state())))
            .await;
    }

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Binary(frame)) => {
                handle_audio_frame(&session, &state, &route_tx, &frame).await;
            }
            Ok(Message::Close(_)) => {
                debug!(session_id = %session_id, "client closed connection");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(session_id = %session_id, "websocket error: {err}");
                break;
            }
        }
    }

    cleanup(&session).await;
    state.sessions.remove(&session_id);
    sender_task.abort();
    info!(
        session_id = %session_id,
        active_sessions = state.sessions.len(),
        "voice session closed"
    );
}

/// Barge-in check. Loud speech while the assistant is processing or
/// speaking cancels the in-flight turn, returns the floor to the user
/// and discards the interrupted turn's buffers. Returns true when this
/// frame interrupted an AI turn.
pub async fn handle_interruption(
    session: &SharedSession,
    routes: &mpsc::Sender<MessageRoute>,
    frame: &[u8],
) -> bool {
    let (current_state, interrupt_threshold) = {
        let s = session.read().await;
        (s.state(), s.detector_config().interrupt_threshold_rms)
    };
    if !matches!(
        current_state,
        SessionState::AiProcessing | SessionState::AiSpeaking
    ) {
        return false;
    }

    let energy = rms_energy(frame);
    if energy <= interrupt_threshold {
        return false;
    }

    info!(energy = %format!("{energy:.0}"), "user interrupted AI turn");
    cancel_turn_task(session).await;
    {
        let mut s = session.write().await;
        s.transition(SessionState::UserSpeaking);
        s.reset_turn();
    }
    let _ = routes
        .send(MessageRoute::Event(OutgoingEvent::status(
            SessionState::UserSpeaking,
        )))
        .await;
    let _ = routes
        .send(MessageRoute::Event(OutgoingEvent::Interrupt))
        .await;
    true
}

/// Route one inbound PCM frame: barge-in check first, then turn
/// detection, then pipeline dispatch when the turn just ended.
async fn handle_audio_frame(
    session: &SharedSession,
    state: &Arc<AppState>,
    routes: &mpsc::Sender<MessageRoute>,
    frame: &[u8],
) {
    handle_interruption(session, routes, frame).await;

    let mut s = session.write().await;
    // Quiet frames during AI turns are dropped here
    if !s.is_state(SessionState::UserSpeaking) {
        return;
    }

    if s.process_frame(frame) {
        if !s.clear_finished_turn() {
            warn!(session_id = %s.id, "turn ended while pipeline still running, ignoring");
            return;
        }
        s.transition(SessionState::AiProcessing);

        let token = CancellationToken::new();
        let handle = tokio::spawn({
            let pipeline = state.pipeline.clone();
            let session = session.clone();
            let routes = routes.clone();
            let token = token.clone();
            async move {
                pipeline.run_turn(session, routes, token).await;
            }
        });
        s.set_turn_task(TurnTask { handle, token });
    }
}
