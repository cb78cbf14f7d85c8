//! Streaming text-to-speech providers

pub mod elevenlabs;

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::config::ServerConfig;

pub use elevenlabs::ElevenLabsTts;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("TTS request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("TTS provider returned {status}: {body}")]
    Provider {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("TTS configuration error: {0}")]
    Configuration(String),
}

/// Synthesizes one sentence into a stream of audio chunks, emitted as
/// the provider produces them.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> BoxStream<'static, Result<Bytes, TtsError>>;

    fn provider_info(&self) -> &'static str;
}

/// Build the configured TTS provider.
pub fn create_tts_provider(config: &ServerConfig) -> Result<Arc<dyn SpeechSynthesizer>, TtsError> {
    let provider = ElevenLabsTts::new(
        config.elevenlabs_api_key.clone(),
        config.elevenlabs_voice_id.clone(),
    )?;
    Ok(Arc::new(provider))
}
