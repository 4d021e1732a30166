//! Opening line generation
//!
//! Uses the streamed response mode and accumulates deltas before cleaning.

use std::sync::Arc;

use parley_models::providers::{ChatRequest, TextGenerator, collect_stream};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::prompts;
use crate::scenario::Scenario;

/// Speaker labels models like to prefix their line with.
const SPEAKER_LABELS: &[&str] = &["assistant", "character", "ai", "bot", "npc"];

/// Greeting used when generation yields nothing usable.
pub fn default_greeting(scenario: &Scenario) -> String {
    format!(
        "Hello! Welcome, let's begin: {}. What would you like to say?",
        scenario.title
    )
}

/// Normalize generated greeting text.
///
/// Trims, drops a leading speaker label such as `Assistant:`, strips
/// surrounding quotes and collapses runs of whitespace.
pub fn clean_greeting(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some((label, rest)) = text.split_once(':')
        && SPEAKER_LABELS.contains(&label.trim().to_ascii_lowercase().as_str())
    {
        text = rest.trim();
    }

    for (open, close) in [('"', '"'), ('\u{201c}', '\u{201d}'), ('\'', '\'')] {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            text = inner.trim();
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Generates the character's opening line.
pub struct GreetingGenerator {
    generator: Arc<dyn TextGenerator>,
    model: String,
    temperature: Option<f32>,
}

impl GreetingGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &EngineConfig) -> Self {
        Self {
            generator,
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    /// Stream a greeting for `scenario`.
    ///
    /// Transport failures (including a stream breaking off) are returned.
    /// Empty output resolves to [`default_greeting`].
    pub async fn generate(&self, scenario: &Scenario) -> Result<String, SessionError> {
        let mut request = ChatRequest::new(&self.model, prompts::greeting_messages(scenario)).stream();
        if let Some(temperature) = self.temperature {
            request = request.temperature(temperature);
        }

        let stream = self
            .generator
            .chat_stream(request)
            .await
            .map_err(SessionError::GreetingGeneration)?;
        let raw = collect_stream(stream)
            .await
            .map_err(SessionError::GreetingGeneration)?;

        let greeting = clean_greeting(&raw);
        if greeting.is_empty() {
            debug!(scenario = %scenario.title, "Empty greeting, using default");
            return Ok(default_greeting(scenario));
        }
        Ok(greeting)
    }

    /// Like [`generate`](Self::generate), absorbing failures into the default.
    pub async fn generate_or_default(&self, scenario: &Scenario) -> String {
        match self.generate(scenario).await {
            Ok(greeting) => greeting,
            Err(e) => {
                warn!(error = %e, scenario = %scenario.title, "Greeting generation failed, using default");
                default_greeting(scenario)
            }
        }
    }
}
