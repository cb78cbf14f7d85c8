//! Shared application state

use anyhow::Context;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::core::llm::create_llm_provider;
use crate::core::pipeline::PipelineOrchestrator;
use crate::core::stt::create_stt_provider;
use crate::core::tts::create_tts_provider;

/// Live sessions, keyed by session id. Values record connect time, which
/// is enough for counting and diagnostics.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Instant>,
}

impl SessionRegistry {
    pub fn insert(&self, id: &str) {
        self.sessions.insert(id.to_string(), Instant::now());
    }

    pub fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

pub struct AppState {
    pub config: ServerConfig,
    pub pipeline: PipelineOrchestrator,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let stt = create_stt_provider(&config).context("building STT provider")?;
        let llm = create_llm_provider(&config).context("building LLM provider")?;
        let tts = create_tts_provider(&config).context("building TTS provider")?;

        Ok(Self {
            pipeline: PipelineOrchestrator::new(stt, llm, tts),
            sessions: SessionRegistry::default(),
            config,
        })
    }
}
