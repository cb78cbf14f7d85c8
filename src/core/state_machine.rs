//! Conversational state machine
//!
//! Each session moves through four states. Only the transitions listed in
//! [`SessionState::can_transition_to`] are legal; anything else is rejected
//! and logged without touching the current state. Teardown uses a force
//! reset that bypasses the table.

use serde::Serialize;
use tracing::{info, warn};

/// Conversational state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "USER_SPEAKING")]
    UserSpeaking,
    #[serde(rename = "AI_PROCESSING")]
    AiProcessing,
    #[serde(rename = "AI_SPEAKING")]
    AiSpeaking,
}

impl SessionState {
    /// Wire representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::UserSpeaking => "USER_SPEAKING",
            SessionState::AiProcessing => "AI_PROCESSING",
            SessionState::AiSpeaking => "AI_SPEAKING",
        }
    }

    /// Whether `target` is reachable from this state.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Idle, UserSpeaking)
                | (UserSpeaking, AiProcessing)
                | (UserSpeaking, Idle)
                | (AiProcessing, AiSpeaking)
                | (AiProcessing, UserSpeaking)
                | (AiProcessing, Idle)
                | (AiSpeaking, UserSpeaking)
                | (AiSpeaking, Idle)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session state machine enforcing the transition table.
#[derive(Debug)]
pub struct StateMachine {
    session_id: String,
    state: SessionState,
}

impl StateMachine {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: SessionState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Attempt a transition. Returns true on success; an illegal transition
    /// leaves the state unchanged and is logged, never fatal.
    pub fn transition(&mut self, target: SessionState) -> bool {
        if self.state.can_transition_to(target) {
            info!(
                session_id = %self.session_id,
                "state: {} -> {}", self.state, target
            );
            self.state = target;
            true
        } else {
            warn!(
                session_id = %self.session_id,
                "invalid transition: {} -> {}", self.state, target
            );
            false
        }
    }

    /// Unconditional reset to `Idle`, bypassing the table. Teardown only.
    pub fn force_idle(&mut self) {
        info!(session_id = %self.session_id, "force reset -> IDLE");
        self.state = SessionState::Idle;
    }

    pub fn is_state(&self, state: SessionState) -> bool {
        self.state == state
    }
}
