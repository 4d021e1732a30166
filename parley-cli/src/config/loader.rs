use super::types::{
    ParleyConfig, ProviderConfig, RawEngineConfig, RawParleyConfig, RawProviderConfig,
    RawRevealConfig,
};
use anyhow::{Context, Result, ensure};
use directories::ProjectDirs;
use parley_core::{EngineConfig, RevealConfig};
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<ParleyConfig> {
        let mut raw = RawParleyConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path() {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        raw = Self::merge_raw(raw, Self::read_raw(&Self::project_config_path())?);

        Self::validate(Self::finalize(raw))
    }

    /// Reject settings no session can run with
    fn validate(config: ParleyConfig) -> Result<ParleyConfig> {
        ensure!(
            config.engine.max_turns >= 1,
            "Invalid config: engine.max_turns must be at least 1"
        );
        Ok(config)
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "parley").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with PARLEY_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("PARLEY_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".parley/config.toml")
        }
    }

    /// Read one layer; a missing file is an empty layer
    fn read_raw(path: &Path) -> Result<RawParleyConfig> {
        if !path.exists() {
            return Ok(RawParleyConfig::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawParleyConfig, overlay: RawParleyConfig) -> RawParleyConfig {
        RawParleyConfig {
            provider: RawProviderConfig {
                base_url: overlay.provider.base_url.or(base.provider.base_url),
                api_key_env: overlay.provider.api_key_env.or(base.provider.api_key_env),
                timeout_secs: overlay.provider.timeout_secs.or(base.provider.timeout_secs),
            },
            engine: RawEngineConfig {
                model: overlay.engine.model.or(base.engine.model),
                max_turns: overlay.engine.max_turns.or(base.engine.max_turns),
                pass_score: overlay.engine.pass_score.or(base.engine.pass_score),
                language_penalty: overlay
                    .engine
                    .language_penalty
                    .or(base.engine.language_penalty),
                temperature: overlay.engine.temperature.or(base.engine.temperature),
                greeting_fallback: overlay
                    .engine
                    .greeting_fallback
                    .or(base.engine.greeting_fallback),
                event_capacity: overlay.engine.event_capacity.or(base.engine.event_capacity),
                reveal: RawRevealConfig {
                    enabled: overlay.engine.reveal.enabled.or(base.engine.reveal.enabled),
                    interval_ms: overlay
                        .engine
                        .reveal
                        .interval_ms
                        .or(base.engine.reveal.interval_ms),
                    chars_per_tick: overlay
                        .engine
                        .reveal
                        .chars_per_tick
                        .or(base.engine.reveal.chars_per_tick),
                },
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawParleyConfig) -> ParleyConfig {
        let provider_defaults = ProviderConfig::default();
        let engine_defaults = EngineConfig::default();
        let reveal_defaults = RevealConfig::default();

        ParleyConfig {
            provider: ProviderConfig {
                base_url: raw.provider.base_url.unwrap_or(provider_defaults.base_url),
                api_key_env: raw
                    .provider
                    .api_key_env
                    .unwrap_or(provider_defaults.api_key_env),
                timeout_secs: raw
                    .provider
                    .timeout_secs
                    .unwrap_or(provider_defaults.timeout_secs),
            },
            engine: EngineConfig {
                model: raw.engine.model.unwrap_or(engine_defaults.model),
                max_turns: raw.engine.max_turns.unwrap_or(engine_defaults.max_turns),
                pass_score: raw.engine.pass_score.unwrap_or(engine_defaults.pass_score),
                language_penalty: raw
                    .engine
                    .language_penalty
                    .unwrap_or(engine_defaults.language_penalty),
                temperature: raw.engine.temperature.or(engine_defaults.temperature),
                greeting_fallback: raw
                    .engine
                    .greeting_fallback
                    .unwrap_or(engine_defaults.greeting_fallback),
                event_capacity: raw
                    .engine
                    .event_capacity
                    .unwrap_or(engine_defaults.event_capacity),
                reveal: RevealConfig {
                    enabled: raw.engine.reveal.enabled.unwrap_or(reveal_defaults.enabled),
                    interval_ms: raw
                        .engine
                        .reveal
                        .interval_ms
                        .unwrap_or(reveal_defaults.interval_ms),
                    chars_per_tick: raw
                        .engine
                        .reveal
                        .chars_per_tick
                        .unwrap_or(reveal_defaults.chars_per_tick),
                },
            },
        }
    }
}
