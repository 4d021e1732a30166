//! Shared engine: generators, configuration and init deduplication
//!
//! One `Engine` serves every session. Sessions hold an `Arc` to it and go
//! through it for all generation calls.

use std::sync::Arc;

use parley_models::providers::TextGenerator;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::evaluator::TurnEvaluator;
use crate::greeting::GreetingGenerator;
use crate::scenario::{Scenario, ScenarioGenerator, SeedContent};
use crate::session::ConversationSession;
use crate::singleflight::SingleFlight;

/// Scenario and opening line produced by session setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preparation {
    pub scenario: Scenario,
    pub greeting: String,
}

type PrepareResult = Result<Arc<Preparation>, SessionError>;

/// Generation front-end shared by all sessions.
pub struct Engine {
    config: EngineConfig,
    scenarios: ScenarioGenerator,
    greetings: GreetingGenerator,
    evaluator: TurnEvaluator,
    setups: SingleFlight<Uuid, PrepareResult>,
}

impl Engine {
    pub fn new(generator: Arc<dyn TextGenerator>, mut config: EngineConfig) -> Arc<Self> {
        if config.max_turns == 0 {
            warn!("max_turns of 0 raised to 1");
            config.max_turns = 1;
        }
        info!(
            provider = generator.name(),
            model = %config.model,
            max_turns = config.max_turns,
            "Creating engine"
        );
        Arc::new(Self {
            scenarios: ScenarioGenerator::new(generator.clone(), &config),
            greetings: GreetingGenerator::new(generator.clone(), &config),
            evaluator: TurnEvaluator::new(generator, &config),
            setups: SingleFlight::new(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &TurnEvaluator {
        &self.evaluator
    }

    /// Create a fresh session bound to this engine.
    pub fn new_session(self: &Arc<Self>) -> Arc<ConversationSession> {
        Arc::new(ConversationSession::new(self.clone()))
    }

    /// Prepare session `id` from `seed`, sharing the work with any caller
    /// already preparing the same session.
    pub(crate) async fn prepare_once(self: &Arc<Self>, id: Uuid, seed: &SeedContent) -> PrepareResult {
        let engine = self.clone();
        let seed = seed.clone();
        self.setups
            .run(id, move || async move {
                engine.prepare(&seed).await.map(Arc::new)
            })
            .await
    }

    /// Whether setup for session `id` is currently running.
    pub fn is_preparing(&self, id: &Uuid) -> bool {
        self.setups.in_flight(id)
    }

    async fn prepare(&self, seed: &SeedContent) -> Result<Preparation, SessionError> {
        let scenario = self.scenarios.generate(seed).await?;
        let greeting = if self.config.greeting_fallback {
            self.greetings.generate_or_default(&scenario).await
        } else {
            self.greetings.generate(&scenario).await?
        };
        debug!(title = %scenario.title, "Session prepared");
        Ok(Preparation { scenario, greeting })
    }
}
