//! Per-turn evaluation
//!
//! One buffered request per learner turn returns the four dimension scores,
//! feedback, the character's next line, and the disallowed-language flag.

use std::sync::Arc;

use parley_models::providers::{ChatRequest, TextGenerator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::parser::{self, Fields};
use crate::prompts;
use crate::scenario::Scenario;
use crate::scoring::ScoreDimensions;
use crate::session::Message;

/// Baseline for a dimension the service did not score.
pub const DEFAULT_DIMENSION_SCORE: u8 = 60;

/// Reply used when the service gives no in-character line.
pub const DEFAULT_REPLY: &str = "I see. Could you tell me a bit more?";

/// Structured judgment of one learner turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub scores: ScoreDimensions,
    pub feedback: String,
    /// The character's next line
    pub response: String,
    pub used_disallowed_language: bool,
}

impl Evaluation {
    /// Read an evaluation object, defaulting each missing or invalid field.
    pub fn from_value(value: &Value) -> Self {
        let fields = Fields::new(value);
        let scores = fields.object("scores");

        Self {
            scores: ScoreDimensions::new(
                scores.score_or("communication", DEFAULT_DIMENSION_SCORE),
                scores.score_or("accuracy", DEFAULT_DIMENSION_SCORE),
                scores.score_or("scenario", DEFAULT_DIMENSION_SCORE),
                scores.score_or("fluency", DEFAULT_DIMENSION_SCORE),
            ),
            feedback: fields.str_or("feedback", ""),
            response: fields.str_or("response", DEFAULT_REPLY),
            used_disallowed_language: match fields.get("hasChinese") {
                Some(_) => fields.bool_or("hasChinese", false),
                None => fields.bool_or("disallowedLanguage", false),
            },
        }
    }
}

impl Default for Evaluation {
    fn default() -> Self {
        Self::from_value(&Value::Null)
    }
}

/// Scores learner turns through the generation service.
pub struct TurnEvaluator {
    generator: Arc<dyn TextGenerator>,
    model: String,
}

impl TurnEvaluator {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &EngineConfig) -> Self {
        Self {
            generator,
            model: config.model.clone(),
        }
    }

    /// Evaluate `user_text` in the context of the conversation so far.
    pub async fn evaluate(
        &self,
        user_text: &str,
        scenario: &Scenario,
        history: &[Message],
        past_scores: &[f64],
    ) -> Result<Evaluation, SessionError> {
        let messages = prompts::evaluation_messages(user_text, scenario, history, past_scores);
        let request = ChatRequest::new(&self.model, messages).temperature(0.0);

        let response = self
            .generator
            .chat(request)
            .await
            .map_err(SessionError::Evaluation)?;

        let value = parser::parse_with(&response.content, Value::Null, Value::is_object);
        if value.is_null() {
            warn!(
                len = response.content.len(),
                "Evaluation response unusable, scoring with defaults"
            );
        }
        let evaluation = Evaluation::from_value(&value);

        debug!(
            communication = evaluation.scores.communication,
            accuracy = evaluation.scores.accuracy,
            scenario_fit = evaluation.scores.scenario_fit,
            fluency = evaluation.scores.fluency,
            disallowed_language = evaluation.used_disallowed_language,
            "Evaluated turn"
        );
        Ok(evaluation)
    }
}
