//! Speech-to-text providers
//!
//! One trait, one HTTP implementation. The gateway only ever talks to
//! `dyn SpeechToText`; the concrete provider is chosen at startup from
//! configuration.

pub mod sarvam;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::time::Duration;
use tracing::warn;

use crate::config::ServerConfig;

pub use sarvam::SarvamStt;

/// Delay before the single retry attempt after a failed transcription.
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum SttError {
    #[error("STT request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("STT provider returned {status}: {body}")]
    Provider {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("audio encoding failed: {0}")]
    Encoding(#[from] hound::Error),

    #[error("STT configuration error: {0}")]
    Configuration(String),
}

/// Turns a complete utterance of raw PCM16 mono audio into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one utterance. `Ok(None)` means the provider saw the
    /// audio but produced nothing usable (too short, pure noise).
    async fn transcribe(&self, audio: Bytes) -> Result<Option<String>, SttError>;

    fn provider_info(&self) -> &'static str;
}

/// Transcribe with one retry after [`RETRY_DELAY`]. Transport and provider
/// errors are logged and collapsed to `None` so a bad network moment reads
/// to the caller the same as an empty utterance.
pub async fn transcribe_with_retry(stt: &dyn SpeechToText, audio: Bytes) -> Option<String> {
    match stt.transcribe(audio.clone()).await {
        Ok(result) => return result,
        Err(err) => {
            warn!(provider = stt.provider_info(), "transcription failed, retrying: {err}");
        }
    }

    tokio::time::sleep(RETRY_DELAY).await;

    match stt.transcribe(audio).await {
        Ok(result) => result,
        Err(err) => {
            warn!(provider = stt.provider_info(), "transcription retry failed: {err}");
            None
        }
    }
}

/// Build the configured STT provider.
pub fn create_stt_provider(config: &ServerConfig) -> Result<Arc<dyn SpeechToText>, SttError> {
    let provider = SarvamStt::new(
        config.sarvam_api_key.clone(),
        config.sarvam_model.clone(),
        config.sarvam_language.clone(),
    )?;
    Ok(Arc::new(provider))
}
