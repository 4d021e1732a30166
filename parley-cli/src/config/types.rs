use std::time::Duration;

use parley_core::EngineConfig;
use parley_models::providers::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};

/// Environment variable holding the API key unless configured otherwise
pub const DEFAULT_API_KEY_ENV: &str = "PARLEY_API_KEY";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawParleyConfig {
    #[serde(default)]
    pub provider: RawProviderConfig,

    #[serde(default)]
    pub engine: RawEngineConfig,
}

/// Provider config as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawProviderConfig {
    /// Base URL of the chat completions endpoint
    pub base_url: Option<String>,

    /// Environment variable to read the API key from
    pub api_key_env: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Engine config as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawEngineConfig {
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub pass_score: Option<u32>,
    pub language_penalty: Option<u32>,
    pub temperature: Option<f32>,
    pub greeting_fallback: Option<bool>,
    pub event_capacity: Option<usize>,

    #[serde(default)]
    pub reveal: RawRevealConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawRevealConfig {
    pub enabled: Option<bool>,
    pub interval_ms: Option<u64>,
    pub chars_per_tick: Option<usize>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParleyConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
