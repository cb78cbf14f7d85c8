//! Streaming language-model providers

pub mod openai;

use std::sync::Arc;

use futures::stream::BoxStream;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::core::session::ChatMessage;

pub use openai::OpenAiChat;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM provider returned {status}: {body}")]
    Provider {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("LLM configuration error: {0}")]
    Configuration(String),
}

/// Streams a chat completion as text fragments in generation order.
pub trait LanguageModel: Send + Sync {
    fn stream_chat(&self, messages: Vec<ChatMessage>) -> BoxStream<'static, Result<String, LlmError>>;

    fn provider_info(&self) -> &'static str;
}

/// Build the configured LLM provider.
pub fn create_llm_provider(config: &ServerConfig) -> Result<Arc<dyn LanguageModel>, LlmError> {
    let provider = OpenAiChat::new(config.openai_api_key.clone(), config.openai_model.clone())?;
    Ok(Arc::new(provider))
}
