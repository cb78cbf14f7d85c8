//! Sarvam AI speech-to-text client
//!
//! Uploads each utterance as a WAV file via multipart form data. Sarvam's
//! Saarika models expect 16 kHz mono PCM, which is exactly what the
//! gateway buffers, so the only transformation is adding a WAV header.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tokio::time::Duration;
use tracing::debug;

use crate::core::audio::{pcm_to_wav, SAMPLE_RATE};

use super::{SpeechToText, SttError};

const SARVAM_STT_URL: &str = "https://api.sarvam.ai/speech-to-text";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Utterances shorter than 100 ms are not worth a network round trip.
pub const MIN_AUDIO_BYTES: usize = 3200;

pub struct SarvamStt {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    language: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    transcript: String,
}

impl SarvamStt {
    pub fn new(api_key: String, model: String, language: String) -> Result<Self, SttError> {
        if api_key.is_empty() {
            return Err(SttError::Configuration(
                "SARVAM_API_KEY is not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: SARVAM_STT_URL.to_string(),
            model,
            language,
        })
    }

    /// Override the endpoint, e.g. to point at a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SpeechToText for SarvamStt {
    async fn transcribe(&self, audio: Bytes) -> Result<Option<String>, SttError> {
        if audio.len() < MIN_AUDIO_BYTES {
            debug!(bytes = audio.len(), "utterance too short, skipping STT");
            return Ok(None);
        }

        let wav = pcm_to_wav(&audio, SAMPLE_RATE)?;

        let file_part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("language_code", self.language.clone());

        let response = self
            .client
            .post(&self.base_url)
            .header("api-subscription-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::Provider { status, body });
        }

        let parsed: TranscribeResponse = response.json().await?;
        let transcript = parsed.transcript.trim();
        if transcript.is_empty() {
            return Ok(None);
        }
        Ok(Some(transcript.to_string()))
    }

    fn provider_info(&self) -> &'static str {
        "sarvam"
    }
}
