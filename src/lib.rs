//! Voxway: a real-time voice dialogue gateway.
//!
//! Accepts raw PCM16 audio over a WebSocket, detects turn boundaries with
//! RMS energy analysis, and answers through a streaming STT -> LLM -> TTS
//! pipeline with sentence-level playback and barge-in interruption.

pub mod config;
pub mod core;
pub mod handlers;
pub mod routes;
pub mod state;
