//! ElevenLabs streaming text-to-speech client

use async_stream::try_stream;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use tokio::time::Duration;

use super::{SpeechSynthesizer, TtsError};

const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const MODEL_ID: &str = "eleven_turbo_v2_5";
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    voice_id: String,
}

impl ElevenLabsTts {
    pub fn new(api_key: String, voice_id: String) -> Result<Self, TtsError> {
        if api_key.is_empty() {
            return Err(TtsError::Configuration(
                "ELEVENLABS_API_KEY is not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: ELEVENLABS_BASE_URL.to_string(),
            voice_id,
        })
    }

    /// Override the endpoint, e.g. to point at a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl SpeechSynthesizer for ElevenLabsTts {
    fn synthesize(&self, text: &str) -> BoxStream<'static, Result<Bytes, TtsError>> {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let url = format!(
            "{}/v1/text-to-speech/{}/stream",
            self.base_url, self.voice_id
        );
        let text = text.to_string();

        Box::pin(try_stream! {
            let body = json!({
                "text": text,
                "model_id": MODEL_ID,
                "voice_settings": {
                    "stability": 0.5,
                    "similarity_boost": 0.75,
                    "style": 0.0,
                    "use_speaker_boost": true,
                },
            });

            let response = client
                .post(&url)
                .header("xi-api-key", &api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                Err(TtsError::Provider { status, body })?;
                unreachable!();
            }

            let mut chunks = response.bytes_stream();
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                if !chunk.is_empty() {
                    yield chunk;
                }
            }
        })
    }

    fn provider_info(&self) -> &'static str {
        "elevenlabs"
    }
}
