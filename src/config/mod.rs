//! Server configuration, loaded from environment variables
//!
//! Everything has a default except the provider API keys, which are only
//! validated when the corresponding provider is constructed.

use std::env;

use thiserror::Error;
use tokio::time::Duration;

use crate::core::turn_detect::TurnDetectorConfig;
use crate::core::tts::elevenlabs::DEFAULT_VOICE_ID;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// Directory of static frontend assets; serving is skipped when unset.
    pub static_dir: Option<String>,

    pub sarvam_api_key: String,
    pub sarvam_model: String,
    pub sarvam_language: String,

    pub openai_api_key: String,
    pub openai_model: String,

    pub elevenlabs_api_key: String,
    pub elevenlabs_voice_id: String,

    pub turn_detection: TurnDetectorConfig,
    pub session_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allowed_origins: vec!["*".to_string()],
            static_dir: None,
            sarvam_api_key: String::new(),
            sarvam_model: "saarika:v2.5".to_string(),
            sarvam_language: "en-IN".to_string(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o-mini".to_string(),
            elevenlabs_api_key: String::new(),
            elevenlabs_voice_id: DEFAULT_VOICE_ID.to_string(),
            turn_detection: TurnDetectorConfig::default(),
            session_timeout: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let turn_defaults = TurnDetectorConfig::default();

        Ok(Self {
            host: env_or("HOST", &defaults.host),
            port: parse_env("PORT", defaults.port)?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_allowed_origins),
            static_dir: env::var("STATIC_DIR").ok().filter(|v| !v.is_empty()),

            sarvam_api_key: env_or("SARVAM_API_KEY", ""),
            sarvam_model: env_or("SARVAM_STT_MODEL", &defaults.sarvam_model),
            sarvam_language: env_or("SARVAM_LANGUAGE", &defaults.sarvam_language),

            openai_api_key: env_or("OPENAI_API_KEY", ""),
            openai_model: env_or("OPENAI_MODEL", &defaults.openai_model),

            elevenlabs_api_key: env_or("ELEVENLABS_API_KEY", ""),
            elevenlabs_voice_id: env_or("ELEVENLABS_VOICE_ID", &defaults.elevenlabs_voice_id),

            turn_detection: TurnDetectorConfig {
                silence_threshold_rms: parse_env(
                    "SILENCE_THRESHOLD_RMS",
                    turn_defaults.silence_threshold_rms,
                )?,
                interrupt_threshold_rms: parse_env(
                    "INTERRUPT_THRESHOLD_RMS",
                    turn_defaults.interrupt_threshold_rms,
                )?,
                turn_end_silence_ms: parse_env(
                    "TURN_END_SILENCE_MS",
                    turn_defaults.turn_end_silence_ms,
                )?,
                min_speech_ms: parse_env("MIN_SPEECH_MS", turn_defaults.min_speech_ms)?,
            },
            session_timeout: Duration::from_secs(parse_env(
                "SESSION_TIMEOUT_SECS",
                defaults.session_timeout.as_secs(),
            )?),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}
