//! Error types for parley-core

use thiserror::Error;
use uuid::Uuid;

use parley_models::Error as GenerationError;

/// Errors related to a conversation session
///
/// Guard violations on `submit_turn` are not errors; they come back as
/// [`Rejection`](crate::session::Rejection) values.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Scenario generation failed: {0}")]
    ScenarioGeneration(#[source] GenerationError),

    #[error("Greeting generation failed: {0}")]
    GreetingGeneration(#[source] GenerationError),

    #[error("Turn evaluation failed: {0}")]
    Evaluation(#[source] GenerationError),

    #[error("Session was aborted")]
    Aborted,

    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl SessionError {
    /// Whether the learner may simply try the same action again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Evaluation(_))
    }
}

/// Errors from the quest progression controller
#[derive(Error, Debug, Clone)]
pub enum ProgressionError {
    #[error("Quest has no chapters")]
    EmptyQuest,

    #[error("Invalid quest phase: expected {expected}, got {actual}")]
    InvalidPhase { expected: String, actual: String },

    #[error("Chapter {index} is not the current chapter ({current})")]
    NotCurrentChapter { index: usize, current: usize },

    #[error("Chapter {index} out of range (quest has {chapters})")]
    ChapterOutOfRange { index: usize, chapters: usize },

    #[error("Session has not settled yet")]
    SessionNotSettled,

    #[error("Session {0} is not the current chapter's session")]
    ForeignSession(Uuid),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}
