//! Per-connection session state
//!
//! A [`Session`] owns everything mutable about one connection: the state
//! machine, the turn detector and its audio buffer, conversation memory,
//! and the exclusive slots for the in-flight turn task and the timeout
//! watcher. The session is shared behind `Arc<RwLock<_>>`; all mutation
//! happens under short-lived write locks, never across an external await.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audio::rms_energy;
use super::state_machine::{SessionState, StateMachine};
use super::turn_detect::{TurnDetector, TurnDetectorConfig};

/// System instruction prepended to every LLM request.
pub const SYSTEM_PROMPT: &str = "You are a helpful voice assistant. \
    Keep every response to 1-2 short sentences - you are speaking aloud, not writing. \
    Never use bullet points, markdown, or lists. Be direct and natural.";

/// How long a cancelled task gets to acknowledge before being aborted.
pub const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// Energy is debug-logged once per this many frames (~1 s at 20 ms/frame).
const ENERGY_LOG_INTERVAL: u64 = 50;

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry of conversation memory, in the shape LLM providers expect.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Handle to one spawned turn pipeline: the task plus its cancellation
/// token. Covers STT, the LLM producer and the TTS consumer, which all
/// observe the same token.
#[derive(Debug)]
pub struct TurnTask {
    pub handle: JoinHandle<()>,
    pub token: CancellationToken,
}

/// Session shared between the gateway loop, the turn pipeline and the
/// timeout watcher.
pub type SharedSession = Arc<RwLock<Session>>;

pub struct Session {
    pub id: String,
    state_machine: StateMachine,
    detector: TurnDetector,

    /// Ordered conversation memory, append-only until cleanup.
    pub memory: Vec<ChatMessage>,

    /// Raw PCM for the current turn, including trailing silence.
    pub audio_buffer: Vec<u8>,

    /// Last time a voiced frame arrived; drives the idle timeout.
    pub last_speech: Instant,
    pub created_at: Instant,

    // Exclusive task slots: at most one of each may be in flight.
    turn_task: Option<TurnTask>,
    timeout_task: Option<JoinHandle<()>>,

    frames_seen: u64,
}

impl Session {
    pub fn new(id: impl Into<String>, detector_config: TurnDetectorConfig) -> Self {
        let id = id.into();
        info!(session_id = %id, "session created");
        Self {
            state_machine: StateMachine::new(id.clone()),
            detector: TurnDetector::new(detector_config),
            id,
            memory: Vec::new(),
            audio_buffer: Vec::new(),
            last_speech: Instant::now(),
            created_at: Instant::now(),
            turn_task: None,
            timeout_task: None,
            frames_seen: 0,
        }
    }

    // -- State helpers ------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state_machine.state()
    }

    pub fn transition(&mut self, target: SessionState) -> bool {
        self.state_machine.transition(target)
    }

    pub fn force_idle(&mut self) {
        self.state_machine.force_idle();
    }

    pub fn is_state(&self, state: SessionState) -> bool {
        self.state_machine.is_state(state)
    }

    pub fn detector_config(&self) -> &TurnDetectorConfig {
        self.detector.config()
    }

    // -- Audio / turn detection ---------------------------------------------

    /// Process one inbound PCM frame. The frame is always buffered, silent
    /// or not, so trailing silence stays in the STT context. Returns true
    /// when the user's turn just ended.
    pub fn process_frame(&mut self, frame: &[u8]) -> bool {
        let energy = rms_energy(frame);
        let voiced = self.detector.observe(energy);
        if voiced {
            self.last_speech = Instant::now();
        }
        self.audio_buffer.extend_from_slice(frame);

        self.frames_seen += 1;
        if self.frames_seen % ENERGY_LOG_INTERVAL == 0 {
            debug!(
                session_id = %self.id,
                energy = %format!("{energy:.0}"),
                voiced = self.detector.voiced_frame_count(),
                silence_run = self.detector.silence_frame_count(),
                "frame energy"
            );
        }

        let turn_ended =
            self.detector.turn_ended() && self.is_state(SessionState::UserSpeaking);
        if turn_ended {
            info!(
                session_id = %self.id,
                voiced_frames = self.detector.voiced_frame_count(),
                silence_frames = self.detector.silence_frame_count(),
                audio_bytes = self.audio_buffer.len(),
                "turn ended"
            );
        }
        turn_ended
    }

    /// Clear the audio buffer and detector counters. Called when a turn is
    /// handed to the pipeline and when an interruption discards one.
    pub fn reset_turn(&mut self) {
        self.audio_buffer.clear();
        self.detector.reset();
    }

    // -- Conversation memory ------------------------------------------------

    pub fn add_user_message(&mut self, text: &str) {
        info!(session_id = %self.id, "user: {text}");
        self.memory.push(ChatMessage::user(text));
    }

    pub fn add_assistant_message(&mut self, text: &str) {
        info!(
            session_id = %self.id,
            "assistant: {:.80}", text
        );
        self.memory.push(ChatMessage::assistant(text));
    }

    /// Full message history for the LLM: the fixed system instruction
    /// followed by the conversation so far, newest last.
    pub fn history(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.memory.len() + 1);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend(self.memory.iter().cloned());
        messages
    }

    // -- Task slots ---------------------------------------------------------

    /// Store the active turn task. The slot must be empty; a leftover task
    /// means a second turn was spawned while one was still in flight.
    pub fn set_turn_task(&mut self, task: TurnTask) {
        if let Some(previous) = self.turn_task.replace(task) {
            warn!(session_id = %self.id, "replacing unexpected live turn task");
            previous.token.cancel();
            previous.handle.abort();
        }
    }

    pub fn take_turn_task(&mut self) -> Option<TurnTask> {
        self.turn_task.take()
    }

    /// Drop a finished turn task from the slot. Returns true when the slot
    /// is empty afterwards, i.e. a new turn may be spawned.
    pub fn clear_finished_turn(&mut self) -> bool {
        match &self.turn_task {
            Some(task) if task.handle.is_finished() => {
                self.turn_task = None;
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    pub fn set_timeout_task(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.timeout_task.replace(handle) {
            previous.abort();
        }
    }

    pub fn take_timeout_task(&mut self) -> Option<JoinHandle<()>> {
        self.timeout_task.take()
    }
}

/// Cancel a turn task and wait up to [`CANCEL_GRACE`] for it to finish.
/// A task that does not acknowledge in time is aborted. Cancellation
/// outcomes are expected here and never propagated.
pub async fn cancel_with_grace(task: TurnTask) {
    task.token.cancel();
    let abort = task.handle.abort_handle();
    match tokio::time::timeout(CANCEL_GRACE, task.handle).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) if err.is_cancelled() => {}
        Ok(Err(err)) => warn!("turn task ended abnormally: {err}"),
        Err(_) => {
            warn!("turn task did not stop within grace period, aborting");
            abort.abort();
        }
    }
}

/// Cancel the session's active turn task, if any. Used on barge-in.
pub async fn cancel_turn_task(session: &SharedSession) {
    let task = session.write().await.take_turn_task();
    if let Some(task) = task {
        let id = { session.read().await.id.clone() };
        cancel_with_grace(task).await;
        info!(session_id = %id, "cancelled active turn task");
    }
}

/// Full session teardown: cancel the turn task with grace, stop the
/// timeout watcher, clear memory and buffers, force the state machine to
/// idle. Safe to call more than once.
pub async fn cleanup(session: &SharedSession) {
    let (turn, timeout) = {
        let mut s = session.write().await;
        (s.take_turn_task(), s.take_timeout_task())
    };

    if let Some(task) = turn {
        cancel_with_grace(task).await;
    }
    if let Some(handle) = timeout {
        handle.abort();
    }

    let mut s = session.write().await;
    s.memory.clear();
    s.audio_buffer.clear();
    s.reset_turn();
    s.force_idle();
    debug!(session_id = %s.id, "session cleaned up");
}
