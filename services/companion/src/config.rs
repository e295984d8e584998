//! Application Configuration Module
//!
//! Loads the companion's settings from the environment into a single struct
//! that `main` hands to the pieces that need it.

use std::env;
use std::path::PathBuf;

use companion_core::chat::DEFAULT_MAX_TURNS;
use tracing::Level;

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8888";
pub const DEFAULT_VOICE_ID: &str = "BpjGufoPiobT79j2vtj4";

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub relay_url: String,
    pub voice_id: String,
    pub tts_model: Option<String>,
    pub max_turns: usize,
    pub asset_dir: PathBuf,
    pub prompt_dir: PathBuf,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `RELAY_URL`: (Optional) Base URL of the companion relay.
    /// *   `VOICE_ID`: (Optional) TTS voice.
    /// *   `TTS_MODEL`: (Optional) TTS model id, sent only when set.
    /// *   `MAX_TURNS`: (Optional) Exchanges kept in history. Defaults to 10.
    /// *   `ASSET_DIR`, `PROMPT_DIR`: (Optional) Default to `assets` and `prompts`.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_turns = match var("MAX_TURNS") {
            Some(value) => match value.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        name: "MAX_TURNS",
                        value,
                    });
                }
            },
            None => DEFAULT_MAX_TURNS,
        };

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            relay_url: var("RELAY_URL").unwrap_or_else(|| DEFAULT_RELAY_URL.to_string()),
            voice_id: var("VOICE_ID").unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            tts_model: var("TTS_MODEL"),
            max_turns,
            asset_dir: var("ASSET_DIR").unwrap_or_else(|| "assets".to_string()).into(),
            prompt_dir: var("PROMPT_DIR").unwrap_or_else(|| "prompts".to_string()).into(),
            log_level,
        })
    }
}
