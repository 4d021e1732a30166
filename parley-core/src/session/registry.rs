//! SessionRegistry for tracking live sessions
//!
//! Front-ends that address sessions by ID (rather than holding the `Arc`)
//! go through the registry. Removing a session aborts it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::SessionError;

use super::state::ConversationSession;
use super::types::SessionPhase;

/// Live sessions indexed by ID
pub struct SessionRegistry {
    engine: Arc<Engine>,
    sessions: RwLock<HashMap<Uuid, Arc<ConversationSession>>>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Create and register a new session.
    pub async fn create_session(&self) -> Arc<ConversationSession> {
        let session = self.engine.new_session();
        self.sessions
            .write()
            .await
            .insert(session.id(), session.clone());
        debug!(session = %session.id(), "Session registered");
        session
    }

    /// Get a session by ID
    pub async fn get(&self, id: &Uuid) -> Result<Arc<ConversationSession>, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// List sessions with their phases
    pub async fn list_sessions(&self) -> Vec<(Uuid, SessionPhase)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, session)| (*id, session.phase()))
            .collect()
    }

    /// Remove a session, aborting it if still running
    pub async fn remove_session(&self, id: &Uuid) -> Result<(), SessionError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.abort();
        debug!(session = %id, "Session removed");
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
