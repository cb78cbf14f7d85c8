//! Core voice-turn machinery: audio analysis, turn detection, the session
//! state machine, and the STT/LLM/TTS pipeline.

pub mod audio;
pub mod events;
pub mod llm;
pub mod pipeline;
pub mod session;
pub mod splitter;
pub mod state_machine;
pub mod stt;
pub mod tts;
pub mod turn_detect;
pub mod watcher;

pub use events::{MessageRoute, OutgoingEvent};
pub use pipeline::PipelineOrchestrator;
pub use session::{Session, SharedSession};
pub use state_machine::SessionState;
pub use turn_detect::{TurnDetector, TurnDetectorConfig};
