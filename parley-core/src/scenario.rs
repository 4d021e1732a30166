//! Scenario types and generation
//!
//! A [`Scenario`] is produced once per chapter from [`SeedContent`] and is
//! immutable afterward.

use std::fmt;
use std::sync::Arc;

use parley_models::providers::{ChatRequest, TextGenerator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::parser::{self, Fields};
use crate::prompts;

/// Goal used when the service omits one.
const DEFAULT_GOAL: &str = "Keep the conversation going and reach a natural conclusion.";

/// Source-content metadata a scenario is seeded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedContent {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SeedContent {
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Difficulty tag of a scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// 1-based ordinal.
    pub fn ordinal(&self) -> u8 {
        match self {
            Difficulty::Beginner => 1,
            Difficulty::Intermediate => 2,
            Difficulty::Advanced => 3,
        }
    }

    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            1 => Some(Difficulty::Beginner),
            2 => Some(Difficulty::Intermediate),
            3 => Some(Difficulty::Advanced),
            _ => None,
        }
    }

    /// Read from an ordinal number, a numeric string or a name.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().and_then(Self::from_ordinal),
            Value::String(s) => {
                let s = s.trim().to_ascii_lowercase();
                if let Ok(n) = s.parse::<i64>() {
                    return Self::from_ordinal(n);
                }
                match s.as_str() {
                    "beginner" | "easy" => Some(Difficulty::Beginner),
                    "intermediate" | "medium" => Some(Difficulty::Intermediate),
                    "advanced" | "hard" => Some(Difficulty::Advanced),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        };
        f.write_str(name)
    }
}

/// One scripted conversational situation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub title: String,
    pub description: String,
    pub context: String,
    pub goal: String,
    pub difficulty: Difficulty,
}

impl Scenario {
    /// Scenario derived from the seed alone.
    pub fn from_seed(seed: &SeedContent) -> Self {
        let summary = if seed.summary.trim().is_empty() {
            format!("A conversation about {}.", seed.title)
        } else {
            seed.summary.trim().to_string()
        };

        Self {
            title: seed.title.clone(),
            description: summary.clone(),
            context: summary,
            goal: DEFAULT_GOAL.to_string(),
            difficulty: Difficulty::default(),
        }
    }

    /// Build from a parsed object, defaulting each field from `fallback`.
    fn from_fields(fields: Fields<'_>, fallback: &Scenario) -> Self {
        Self {
            title: fields.str_or("title", &fallback.title),
            description: fields.str_or("description", &fallback.description),
            context: fields.str_or("context", &fallback.context),
            goal: fields.str_or("goal", &fallback.goal),
            difficulty: fields
                .get("difficulty")
                .and_then(Difficulty::from_value)
                .unwrap_or(fallback.difficulty),
        }
    }
}

/// Asks the generation service for a scenario.
pub struct ScenarioGenerator {
    generator: Arc<dyn TextGenerator>,
    model: String,
    temperature: Option<f32>,
}

impl ScenarioGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &EngineConfig) -> Self {
        Self {
            generator,
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    /// Generate a scenario for `seed`.
    ///
    /// Transport failures are returned; unusable content falls back to
    /// [`Scenario::from_seed`] field by field.
    pub async fn generate(&self, seed: &SeedContent) -> Result<Scenario, SessionError> {
        let mut request = ChatRequest::new(&self.model, prompts::scenario_messages(seed));
        if let Some(temperature) = self.temperature {
            request = request.temperature(temperature);
        }

        let response = self
            .generator
            .chat(request)
            .await
            .map_err(SessionError::ScenarioGeneration)?;

        let fallback = Scenario::from_seed(seed);
        let value = parser::parse_with(&response.content, Value::Null, Value::is_object);
        if value.is_null() {
            debug!(seed = %seed.title, "Scenario response unusable, deriving from seed");
        }
        let scenario = Scenario::from_fields(Fields::new(&value), &fallback);

        info!(
            title = %scenario.title,
            difficulty = %scenario.difficulty,
            "Generated scenario"
        );
        Ok(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_models::Error as GenerationError;
    use parley_models::providers::ScriptedProvider;
    use serde_json::json;

    fn seed() -> SeedContent {
        SeedContent::new("Street food in Taipei", "Night markets and snacks")
    }

    fn generator(provider: Arc<ScriptedProvider>) -> ScenarioGenerator {
        ScenarioGenerator::new(provider, &EngineConfig::instant())
    }

    #[test]
    fn difficulty_parses_ordinals_and_names() {
        assert_eq!(Difficulty::from_value(&json!(1)), Some(Difficulty::Beginner));
        assert_eq!(Difficulty::from_value(&json!("3")), Some(Difficulty::Advanced));
        assert_eq!(Difficulty::from_value(&json!("Medium")), Some(Difficulty::Intermediate));
        assert_eq!(Difficulty::from_value(&json!(9)), None);
        assert_eq!(Difficulty::from_value(&json!(null)), None);
        assert_eq!(Difficulty::Advanced.ordinal(), 3);
        assert!(Difficulty::Beginner < Difficulty::Advanced);
    }

    #[test]
    fn from_seed_fills_every_field() {
        let scenario = Scenario::from_seed(&SeedContent::new("Banking", ""));
        assert_eq!(scenario.title, "Banking");
        assert_eq!(scenario.description, "A conversation about Banking.");
        assert_eq!(scenario.goal, DEFAULT_GOAL);
        assert_eq!(scenario.difficulty, Difficulty::Intermediate);
    }

    #[tokio::test]
    async fn generates_scenario_from_fenced_json() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.queue_text(
            "Here you go:\n```json\n{\"title\":\"Night Market\",\"description\":\"Buy snacks\",\
             \"context\":\"A vendor at a busy stall\",\"goal\":\"Order two dishes\",\"difficulty\":1}\n```",
        );

        let scenario = generator(provider.clone()).generate(&seed()).await.unwrap();

        assert_eq!(scenario.title, "Night Market");
        assert_eq!(scenario.goal, "Order two dishes");
        assert_eq!(scenario.difficulty, Difficulty::Beginner);
        assert!(!provider.requests()[0].stream);
    }

    #[tokio::test]
    async fn missing_fields_default_individually() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.queue_text(r#"{"title":"Night Market","difficulty":"extreme"}"#);

        let scenario = generator(provider).generate(&seed()).await.unwrap();

        assert_eq!(scenario.title, "Night Market");
        assert_eq!(scenario.context, "Night markets and snacks");
        assert_eq!(scenario.goal, DEFAULT_GOAL);
        assert_eq!(scenario.difficulty, Difficulty::Intermediate);
    }

    #[tokio::test]
    async fn unparseable_content_falls_back_to_seed() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.queue_text("I cannot comply.");

        let scenario = generator(provider).generate(&seed()).await.unwrap();
        assert_eq!(scenario, Scenario::from_seed(&seed()));
    }

    #[tokio::test]
    async fn transport_failure_is_returned() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.queue_error(GenerationError::Request("connection refused".to_string()));

        let err = generator(provider).generate(&seed()).await.unwrap_err();
        assert!(matches!(err, SessionError::ScenarioGeneration(_)));
    }
}
