//! Session data types: messages, phases, reports and events

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evaluator::Evaluation;
use crate::scenario::Scenario;
use crate::scoring::{ScoreDimensions, TurnScore};

/// Who said a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    System,
    Assistant,
    User,
}

impl Speaker {
    /// Label used in transcripts
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::System => "System",
            Speaker::Assistant => "Character",
            Speaker::User => "Learner",
        }
    }
}

/// One utterance in the conversation
///
/// Only a just-submitted user message is ever modified, to attach its
/// scores and feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreDimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl Message {
    fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
            scores: None,
            feedback: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Speaker::System, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text)
    }
}

/// Why a session ended without completing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// Owner called `abort`
    Cancelled,
    /// Scenario or greeting generation failed
    SetupFailed(String),
}

/// Phase of a conversation session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    GeneratingScenario,
    AwaitingInput,
    Evaluating,
    RevealingReply,
    Completed { passed: bool },
    Aborted { reason: AbortReason },
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Completed { .. } | SessionPhase::Aborted { .. }
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::GeneratingScenario => f.write_str("GeneratingScenario"),
            SessionPhase::AwaitingInput => f.write_str("AwaitingInput"),
            SessionPhase::Evaluating => f.write_str("Evaluating"),
            SessionPhase::RevealingReply => f.write_str("RevealingReply"),
            SessionPhase::Completed { passed } => write!(f, "Completed(passed={})", passed),
            SessionPhase::Aborted { .. } => f.write_str("Aborted"),
        }
    }
}

/// Progress of one chapter's conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Completed turns
    pub turn: u32,
    /// Cumulative mean of completed turns' final scores
    pub running_total: u32,
    pub turn_scores: Vec<f64>,
    pub completed: bool,
}

/// Result of one accepted turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    /// 1-based number of the turn just completed
    pub turn: u32,
    pub evaluation: Evaluation,
    pub score: TurnScore,
    pub running_total: u32,
    /// Change in running total; for transient display only
    pub score_delta: i32,
    /// Set when this turn completed the session
    pub passed: Option<bool>,
}

impl TurnReport {
    pub fn completed_session(&self) -> bool {
        self.passed.is_some()
    }
}

/// Why `submit_turn` ignored a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    EmptyInput,
    NotAwaitingInput(SessionPhase),
    SessionCompleted,
    SessionAborted,
}

/// Outcome of `submit_turn`
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Accepted(TurnReport),
    Rejected(Rejection),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted(_))
    }

    pub fn report(&self) -> Option<&TurnReport> {
        match self {
            SubmitOutcome::Accepted(report) => Some(report),
            SubmitOutcome::Rejected(_) => None,
        }
    }
}

/// Final result of a completed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub final_score: u32,
    pub passed: bool,
    pub turn_scores: Vec<f64>,
}

/// Immutable copy of a session's observable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub phase: SessionPhase,
    pub scenario: Option<Scenario>,
    pub state: SessionState,
    pub messages: Vec<Message>,
}

/// Events broadcast by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
    },
    MessageAppended {
        message: Message,
    },
    /// A user message was withdrawn after its evaluation failed
    MessageRetracted {
        id: Uuid,
    },
    TurnScored {
        turn: u32,
        final_score: f64,
        running_total: u32,
        delta: i32,
    },
    RevealProgress {
        message_id: Uuid,
        visible: String,
        done: bool,
    },
    Completed {
        final_score: u32,
        passed: bool,
    },
    Aborted {
        reason: AbortReason,
    },
}
