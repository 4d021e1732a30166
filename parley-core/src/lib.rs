//! parley-core: Turn-based conversational assessment engine
//!
//! This crate provides:
//!
//! - **Sessions** - [`ConversationSession`], a per-chapter state machine
//!   that generates a scenario, scores learner turns and settles a verdict
//! - **Quests** - [`ProgressionController`] sequencing chapters into a
//!   quest-level score
//! - **Generators** - scenario, greeting and turn evaluation over any
//!   [`TextGenerator`](parley_models::providers::TextGenerator)
//! - **Response parsing** - [`parser`] pulls JSON out of free-form
//!   generated text and never fails
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use parley_core::{Engine, EngineConfig, SeedContent, SubmitOutcome};
//! use parley_models::providers::ChatCompletionsProvider;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(Arc::new(ChatCompletionsProvider::new()), EngineConfig::default());
//!     let session = engine.new_session();
//!     session.start(&SeedContent::new("At the pharmacy", "Buying cold medicine")).await?;
//!
//!     if let SubmitOutcome::Accepted(report) = session.submit_turn("I need something for a cold").await? {
//!         println!("turn {} scored {}", report.turn, report.score.final_score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod greeting;
pub mod parser;
pub mod progression;
pub mod prompts;
pub mod reveal;
pub mod scenario;
pub mod scoring;
pub mod session;
pub mod singleflight;

// Re-export key types for convenience
pub use config::{EngineConfig, MAX_TURNS, PASS_SCORE, RevealConfig};
pub use engine::Engine;
pub use error::{ProgressionError, SessionError};
pub use evaluator::{Evaluation, TurnEvaluator};
pub use greeting::GreetingGenerator;
pub use progression::{
    Advance, ChapterOutcome, ProgressionController, Quest, QuestEvent, QuestPhase, QuestProgress,
    QuestSummary,
};
pub use scenario::{Difficulty, Scenario, ScenarioGenerator, SeedContent};
pub use scoring::{ScoreDimensions, TurnScore};
pub use session::{
    ConversationSession, Message, Rejection, SessionEvent, SessionPhase, SessionRegistry,
    SessionState, Settlement, Speaker, SubmitOutcome, TurnReport,
};
