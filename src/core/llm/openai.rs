//! OpenAI chat-completions client with SSE streaming
//!
//! Issues a single `stream: true` completion request and re-emits each
//! delta as soon as its SSE line is complete. Lines are reassembled from
//! the byte stream by hand since chunk boundaries do not respect them.

use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::time::Duration;
use tracing::debug;

use crate::core::session::ChatMessage;

use super::{LanguageModel, LlmError};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 150;

pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    pub fn new(api_key: String, model: String) -> Result<Self, LlmError> {
        if api_key.is_empty() {
            return Err(LlmError::Configuration(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: OPENAI_CHAT_URL.to_string(),
            model,
        })
    }

    /// Override the endpoint, e.g. to point at a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl LanguageModel for OpenAiChat {
    fn stream_chat(&self, messages: Vec<ChatMessage>) -> BoxStream<'static, Result<String, LlmError>> {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let url = self.base_url.clone();
        let model = self.model.clone();

        Box::pin(try_stream! {
            let body = json!({
                "model": model,
                "messages": messages,
                "temperature": TEMPERATURE,
                "max_tokens": MAX_TOKENS,
                "stream": true,
            });

            let response = client
                .post(&url)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                Err(LlmError::Provider { status, body })?;
                unreachable!();
            }

            let mut bytes = response.bytes_stream();
            let mut line_buf = String::new();

            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = chunk?;
                line_buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = line_buf.find('\n') {
                    let line: String = line_buf.drain(..=newline).collect();
                    let line = line.trim();

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        break 'outer;
                    }

                    // Keep-alives and malformed frames are skipped, not fatal
                    let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) else {
                        debug!("skipping unparseable stream line");
                        continue;
                    };
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                yield content;
                            }
                        }
                    }
                }
            }
        })
    }

    fn provider_info(&self) -> &'static str {
        "openai"
    }
}
