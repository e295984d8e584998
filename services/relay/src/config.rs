//! Relay configuration, read from the environment.
//!
//! API keys are optional at startup: a relay without an LLM key still serves
//! speech, and the missing key is reported by the route that needs it.

use std::env;
use std::net::SocketAddr;

use secrecy::SecretString;
use tracing::Level;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8888";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: Option<SecretString>,
    pub elevenlabs_api_key: Option<SecretString>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub elevenlabs_base_url: String,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid BIND_ADDRESS: {0}")]
    InvalidAddress(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    ///
    /// *   `BIND_ADDRESS`: (Optional) Defaults to `0.0.0.0:8888`.
    /// *   `GEMINI_API_KEY`, `ELEVENLABS_API_KEY`: upstream credentials.
    /// *   `GEMINI_MODEL`: (Optional) Defaults to `gemini-1.5-flash-latest`.
    /// *   `GEMINI_BASE_URL`, `ELEVENLABS_BASE_URL`: (Optional) upstream hosts.
    /// *   `RUST_LOG`: (Optional) Defaults to `INFO`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let address = non_empty("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        let bind_address = address
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidAddress(address))?;

        let log_level_str = non_empty("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            bind_address,
            gemini_api_key: non_empty("GEMINI_API_KEY").map(SecretString::from),
            elevenlabs_api_key: non_empty("ELEVENLABS_API_KEY").map(SecretString::from),
            gemini_model: non_empty("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: trim_base(
                non_empty("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            ),
            elevenlabs_base_url: trim_base(
                non_empty("ELEVENLABS_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_ELEVENLABS_BASE_URL.to_string()),
            ),
            log_level,
        })
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
