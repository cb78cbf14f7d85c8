//! Outbound wire protocol
//!
//! Events are serialized as JSON text frames tagged by `type`, interleaved
//! with binary frames carrying synthesized audio. [`MessageRoute`] is the
//! envelope the pipeline stages hand to the per-connection sender task,
//! which is the only writer on the outbound socket half.

use bytes::Bytes;
use serde::Serialize;

use super::state_machine::SessionState;

/// Status label sent when a session is closed for inactivity.
pub const TIMEOUT_STATE: &str = "TIMEOUT";

/// Outgoing JSON events (server -> client).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingEvent {
    /// Conversational state, with an optional sub-stage label
    /// ("transcribing", "thinking") during AI processing.
    #[serde(rename = "status")]
    Status {
        state: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },

    /// Finalized user utterance.
    #[serde(rename = "transcript")]
    Transcript { text: String },

    /// Recoverable turn-level failure, user-facing.
    #[serde(rename = "error")]
    Error { message: String },

    /// Marks the beginning of synthesized audio for a turn.
    #[serde(rename = "audio_start")]
    AudioStart,

    /// Sent exactly once per turn attempt, even on failure.
    #[serde(rename = "audio_end")]
    AudioEnd { audio_bytes_sent: u64 },

    /// Full assistant utterance plus whether audio accompanied it,
    /// for client-side fallback rendering.
    #[serde(rename = "tts_text")]
    TtsText { text: String, has_audio: bool },

    /// Barge-in cancelled an in-progress AI turn.
    #[serde(rename = "interrupt")]
    Interrupt,
}

impl OutgoingEvent {
    /// Status event for a session state.
    pub fn status(state: SessionState) -> Self {
        OutgoingEvent::Status {
            state: state.as_str().to_string(),
            stage: None,
        }
    }

    /// Status event with a processing sub-stage label.
    pub fn status_with_stage(state: SessionState, stage: &str) -> Self {
        OutgoingEvent::Status {
            state: state.as_str().to_string(),
            stage: Some(stage.to_string()),
        }
    }

    /// Status event announcing the idle-timeout closure.
    pub fn timeout_status() -> Self {
        OutgoingEvent::Status {
            state: TIMEOUT_STATE.to_string(),
            stage: None,
        }
    }
}

/// Message routing for the per-connection sender task.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageRoute {
    /// JSON event frame.
    Event(OutgoingEvent),
    /// Binary synthesized audio.
    Audio(Bytes),
    /// Close the connection with a normal-closure frame.
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json =
            serde_json::to_string(&OutgoingEvent::status(SessionState::UserSpeaking)).unwrap();
        assert_eq!(json, r#"{"type":"status","state":"USER_SPEAKING"}"#);
    }

    #[test]
    fn test_status_with_stage_serialization() {
        let event = OutgoingEvent::status_with_stage(SessionState::AiProcessing, "thinking");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""state":"AI_PROCESSING""#));
        assert!(json.contains(r#""stage":"thinking""#));
    }

    #[test]
    fn test_timeout_status_serialization() {
        let json = serde_json::to_string(&OutgoingEvent::timeout_status()).unwrap();
        assert_eq!(json, r#"{"type":"status","state":"TIMEOUT"}"#);
    }

    #[test]
    fn test_audio_markers_serialization() {
        let json = serde_json::to_string(&OutgoingEvent::AudioStart).unwrap();
        assert_eq!(json, r#"{"type":"audio_start"}"#);

        let json = serde_json::to_string(&OutgoingEvent::AudioEnd {
            audio_bytes_sent: 20,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"audio_end","audio_bytes_sent":20}"#);
    }

    #[test]
    fn test_tts_text_serialization() {
        let event = OutgoingEvent::TtsText {
            text: "Hello there.".to_string(),
            has_audio: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tts_text""#));
        assert!(json.contains(r#""has_audio":true"#));
    }

    #[test]
    fn test_interrupt_serialization() {
        let json = serde_json::to_string(&OutgoingEvent::Interrupt).unwrap();
        assert_eq!(json, r#"{"type":"interrupt"}"#);
    }
}
