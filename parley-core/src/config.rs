//! Engine configuration
//!
//! All fields have defaults so partial TOML sections deserialize cleanly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of scored turns in one chapter's conversation.
pub const MAX_TURNS: u32 = 5;

/// Minimum running total (and quest average) that counts as a pass.
pub const PASS_SCORE: u32 = 80;

/// Points deducted from a turn that used disallowed language.
pub const LANGUAGE_PENALTY: u32 = 15;

/// Default model requested from the generation service.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Tunables for sessions and quests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model requested from the generation service
    pub model: String,
    /// Turns per session
    pub max_turns: u32,
    /// Pass threshold for chapters and quests
    pub pass_score: u32,
    /// Deduction for disallowed-language turns
    pub language_penalty: u32,
    /// Sampling temperature for scenario and greeting generation
    pub temperature: Option<f32>,
    /// Use a default greeting when greeting generation fails
    pub greeting_fallback: bool,
    /// Capacity of each session's event channel
    pub event_capacity: usize,
    /// Typewriter reveal of assistant replies
    pub reveal: RevealConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_turns: MAX_TURNS,
            pass_score: PASS_SCORE,
            language_penalty: LANGUAGE_PENALTY,
            temperature: Some(0.8),
            greeting_fallback: true,
            event_capacity: 256,
            reveal: RevealConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Config with reveal disabled, for tests and non-interactive use.
    pub fn instant() -> Self {
        Self {
            reveal: RevealConfig::disabled(),
            ..Self::default()
        }
    }
}

/// Typewriter reveal settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    pub enabled: bool,
    /// Milliseconds between frames
    pub interval_ms: u64,
    /// Characters added per frame
    pub chars_per_tick: usize,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30,
            chars_per_tick: 1,
        }
    }
}

impl RevealConfig {
    /// Reveal turned off; replies appear at once.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Frame interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_turns, 5);
        assert_eq!(config.pass_score, 80);
        assert_eq!(config.language_penalty, 15);
        assert!(config.greeting_fallback);
        assert!(config.reveal.enabled);
        assert_eq!(config.reveal.interval(), Duration::from_millis(30));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
max_turns = 3

[reveal]
enabled = false
"#,
        )
        .unwrap();

        assert_eq!(config.max_turns, 3);
        assert_eq!(config.pass_score, PASS_SCORE);
        assert!(!config.reveal.enabled);
        assert_eq!(config.reveal.chars_per_tick, 1);
    }

    #[test]
    fn test_instant_disables_reveal() {
        assert!(!EngineConfig::instant().reveal.enabled);
    }
}
