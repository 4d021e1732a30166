//! Conversation sessions

pub mod registry;
pub mod state;
mod types;

pub use registry::SessionRegistry;
pub use state::ConversationSession;
pub use types::{
    AbortReason, Message, Rejection, SessionEvent, SessionPhase, SessionSnapshot, SessionState,
    Settlement, Speaker, SubmitOutcome, TurnReport,
};
