//! The per-chapter conversation state machine
//!
//! ```text
//! GeneratingScenario -> AwaitingInput -> Evaluating -> RevealingReply -> AwaitingInput ...
//!                                                  \-> Completed (turn cap reached)
//! any non-terminal phase -> Aborted
//! ```
//!
//! Every operation takes `&self`. State lives behind a mutex that is never
//! held across an await; generation calls run unlocked and re-check the
//! phase when they finish, so a result that arrives after an abort is
//! dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::SessionError;
use crate::reveal::{self, RevealHandle};
use crate::scenario::{Scenario, SeedContent};
use crate::scoring::{TurnScore, is_passing, next_running_total};

use super::types::{
    AbortReason, Message, Rejection, SessionEvent, SessionPhase, SessionSnapshot, SessionState,
    Settlement, SubmitOutcome, TurnReport,
};

struct ActiveReveal {
    id: u64,
    message_id: Uuid,
    text: String,
    handle: RevealHandle,
}

struct Inner {
    phase: SessionPhase,
    scenario: Option<Scenario>,
    messages: Vec<Message>,
    state: SessionState,
    reveal: Option<ActiveReveal>,
    next_reveal_id: u64,
}

impl Inner {
    fn set_phase(&mut self, to: SessionPhase, events: &broadcast::Sender<SessionEvent>) {
        if self.phase == to {
            return;
        }
        let from = std::mem::replace(&mut self.phase, to.clone());
        debug!(from = %from, to = %to, "Session phase changed");
        let _ = events.send(SessionEvent::PhaseChanged { from, to });
    }

    fn push_message(&mut self, message: Message, events: &broadcast::Sender<SessionEvent>) {
        let _ = events.send(SessionEvent::MessageAppended {
            message: message.clone(),
        });
        self.messages.push(message);
    }

    /// Stop the running reveal, if any. Returns the message it was showing.
    fn cancel_reveal(&mut self) -> Option<ActiveReveal> {
        let active = self.reveal.take()?;
        active.handle.cancel();
        Some(active)
    }

    fn guard(&self, text: &str, max_turns: u32) -> Option<Rejection> {
        match &self.phase {
            SessionPhase::Completed { .. } => Some(Rejection::SessionCompleted),
            SessionPhase::Aborted { .. } => Some(Rejection::SessionAborted),
            SessionPhase::AwaitingInput if self.state.turn >= max_turns => {
                Some(Rejection::SessionCompleted)
            }
            SessionPhase::AwaitingInput if text.is_empty() => Some(Rejection::EmptyInput),
            SessionPhase::AwaitingInput => None,
            other => Some(Rejection::NotAwaitingInput(other.clone())),
        }
    }
}

/// One chapter's practice conversation.
pub struct ConversationSession {
    id: Uuid,
    engine: Arc<Engine>,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<SessionEvent>,
}

impl ConversationSession {
    pub fn new(engine: Arc<Engine>) -> Self {
        let (events, _) = broadcast::channel(engine.config().event_capacity.max(1));
        Self {
            id: Uuid::new_v4(),
            engine,
            inner: Arc::new(Mutex::new(Inner {
                phase: SessionPhase::GeneratingScenario,
                scenario: None,
                messages: Vec::new(),
                state: SessionState::default(),
                reveal: None,
                next_reveal_id: 0,
            })),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase.clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn scenario(&self) -> Option<Scenario> {
        self.lock().scenario.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            id: self.id,
            phase: inner.phase.clone(),
            scenario: inner.scenario.clone(),
            state: inner.state.clone(),
            messages: inner.messages.clone(),
        }
    }

    /// Final score and verdict, once the session has completed.
    pub fn settlement(&self) -> Option<Settlement> {
        let inner = self.lock();
        match inner.phase {
            SessionPhase::Completed { passed } => Some(Settlement {
                final_score: inner.state.running_total,
                passed,
                turn_scores: inner.state.turn_scores.clone(),
            }),
            _ => None,
        }
    }

    /// Generate the scenario and greeting, then await the first turn.
    ///
    /// Concurrent and repeated calls share one setup; once the session is
    /// past setup this returns its scenario without further generation.
    pub async fn start(&self, seed: &SeedContent) -> Result<Scenario, SessionError> {
        {
            let inner = self.lock();
            match &inner.phase {
                SessionPhase::GeneratingScenario => {}
                SessionPhase::Aborted { .. } => return Err(SessionError::Aborted),
                other => {
                    return inner.scenario.clone().ok_or_else(|| SessionError::InvalidState {
                        expected: "scenario".to_string(),
                        actual: other.to_string(),
                    });
                }
            }
        }

        let prepared = self.engine.prepare_once(self.id, seed).await;

        let mut inner = self.lock();
        let phase = inner.phase.clone();
        match prepared {
            Ok(prep) => match phase {
                SessionPhase::GeneratingScenario => {
                    let max_turns = self.engine.config().max_turns;
                    inner.scenario = Some(prep.scenario.clone());
                    inner.push_message(
                        Message::system(format!(
                            "Scenario: {}. Goal: {} You have {} turns.",
                            prep.scenario.title, prep.scenario.goal, max_turns
                        )),
                        &self.events,
                    );
                    inner.push_message(Message::assistant(prep.greeting.clone()), &self.events);
                    inner.set_phase(SessionPhase::AwaitingInput, &self.events);
                    info!(session = %self.id, title = %prep.scenario.title, "Session started");
                    Ok(prep.scenario.clone())
                }
                SessionPhase::Aborted { .. } => {
                    debug!(session = %self.id, "Setup finished after abort, discarding");
                    Err(SessionError::Aborted)
                }
                // Another caller already applied the shared result.
                _ => Ok(prep.scenario.clone()),
            },
            Err(e) => {
                if phase == SessionPhase::GeneratingScenario {
                    warn!(session = %self.id, error = %e, "Session setup failed");
                    let reason = AbortReason::SetupFailed(e.to_string());
                    inner.set_phase(
                        SessionPhase::Aborted {
                            reason: reason.clone(),
                        },
                        &self.events,
                    );
                    let _ = self.events.send(SessionEvent::Aborted { reason });
                }
                Err(e)
            }
        }
    }

    /// Submit one learner turn.
    ///
    /// Guard violations return `Ok(Rejected(..))` and change nothing; a
    /// submit while a reply is still revealing first cuts the reveal short.
    /// A failed evaluation returns the error, withdraws the learner's
    /// message and leaves the session awaiting the same turn.
    pub async fn submit_turn(&self, text: &str) -> Result<SubmitOutcome, SessionError> {
        let text = text.trim();
        let config = self.engine.config();

        let (user_id, scenario, history, past_scores) = {
            let mut inner = self.lock();

            if inner.phase == SessionPhase::RevealingReply
                && let Some(active) = inner.cancel_reveal()
            {
                self.finish_reveal_frame(&active);
                inner.set_phase(SessionPhase::AwaitingInput, &self.events);
            }

            if let Some(rejection) = inner.guard(text, config.max_turns) {
                debug!(session = %self.id, rejection = ?rejection, "Turn rejected");
                return Ok(SubmitOutcome::Rejected(rejection));
            }

            let Some(scenario) = inner.scenario.clone() else {
                return Err(SessionError::InvalidState {
                    expected: "scenario".to_string(),
                    actual: "none".to_string(),
                });
            };
            let history = inner.messages.clone();
            let past_scores = inner.state.turn_scores.clone();

            let message = Message::user(text);
            let user_id = message.id;
            inner.push_message(message, &self.events);
            inner.set_phase(SessionPhase::Evaluating, &self.events);
            (user_id, scenario, history, past_scores)
        };

        let result = self
            .engine
            .evaluator()
            .evaluate(text, &scenario, &history, &past_scores)
            .await;

        let mut inner = self.lock();
        if inner.phase != SessionPhase::Evaluating {
            warn!(session = %self.id, phase = %inner.phase, "Discarding evaluation for ended session");
            return Err(SessionError::Aborted);
        }

        let evaluation = match result {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!(session = %self.id, error = %e, "Turn evaluation failed");
                inner.messages.retain(|m| m.id != user_id);
                let _ = self.events.send(SessionEvent::MessageRetracted { id: user_id });
                inner.set_phase(SessionPhase::AwaitingInput, &self.events);
                return Err(e);
            }
        };

        let score = TurnScore::compute(
            &evaluation.scores,
            evaluation.used_disallowed_language,
            config.language_penalty,
        );
        let old_total = inner.state.running_total;
        let new_total = next_running_total(old_total, inner.state.turn, score.final_score);
        let delta = new_total as i32 - old_total as i32;

        if let Some(message) = inner.messages.iter_mut().find(|m| m.id == user_id) {
            message.scores = Some(evaluation.scores);
            message.feedback = Some(evaluation.feedback.clone());
        }
        inner.state.turn_scores.push(score.final_score);
        inner.state.running_total = new_total;
        inner.state.turn += 1;
        let turn = inner.state.turn;

        let _ = self.events.send(SessionEvent::TurnScored {
            turn,
            final_score: score.final_score,
            running_total: new_total,
            delta,
        });

        let reply = Message::assistant(evaluation.response.clone());
        let reply_id = reply.id;
        inner.push_message(reply, &self.events);

        let passed = if turn >= config.max_turns {
            let passed = is_passing(new_total, config.pass_score);
            inner.state.completed = true;
            inner.set_phase(SessionPhase::Completed { passed }, &self.events);
            let _ = self.events.send(SessionEvent::Completed {
                final_score: new_total,
                passed,
            });
            info!(session = %self.id, final_score = new_total, passed, "Session completed");
            Some(passed)
        } else {
            if !config.reveal.enabled {
                inner.set_phase(SessionPhase::AwaitingInput, &self.events);
            }
            None
        };

        if config.reveal.enabled {
            // On the last turn the reveal is presentation only.
            if passed.is_none() {
                inner.set_phase(SessionPhase::RevealingReply, &self.events);
            }
            self.start_reveal(&mut inner, reply_id, evaluation.response.clone());
        }

        debug!(
            session = %self.id,
            turn,
            raw = score.raw,
            final_score = score.final_score,
            running_total = new_total,
            "Turn scored"
        );

        Ok(SubmitOutcome::Accepted(TurnReport {
            turn,
            evaluation,
            score,
            running_total: new_total,
            score_delta: delta,
            passed,
        }))
    }

    fn start_reveal(&self, inner: &mut Inner, message_id: Uuid, text: String) {
        let reveal_config = &self.engine.config().reveal;
        let id = inner.next_reveal_id;
        inner.next_reveal_id += 1;

        let shared = self.inner.clone();
        let events = self.events.clone();
        let handle = reveal::spawn(
            text.clone(),
            reveal_config.interval(),
            reveal_config.chars_per_tick,
            move |frame| {
                let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if !inner.reveal.as_ref().is_some_and(|r| r.id == id) {
                    return;
                }
                let _ = events.send(SessionEvent::RevealProgress {
                    message_id,
                    visible: frame.visible,
                    done: frame.done,
                });
                if frame.done {
                    inner.reveal = None;
                    if inner.phase == SessionPhase::RevealingReply {
                        inner.set_phase(SessionPhase::AwaitingInput, &events);
                    }
                }
            },
        );

        inner.reveal = Some(ActiveReveal {
            id,
            message_id,
            text,
            handle,
        });
    }

    /// Emit the full text of a reveal that was cut short.
    fn finish_reveal_frame(&self, active: &ActiveReveal) {
        let _ = self.events.send(SessionEvent::RevealProgress {
            message_id: active.message_id,
            visible: active.text.clone(),
            done: true,
        });
    }

    /// Show the current reply in full and stop revealing it.
    ///
    /// Returns `false` when no reveal was running.
    pub fn skip_reveal(&self) -> bool {
        let mut inner = self.lock();
        let Some(active) = inner.cancel_reveal() else {
            return false;
        };
        self.finish_reveal_frame(&active);
        if inner.phase == SessionPhase::RevealingReply {
            inner.set_phase(SessionPhase::AwaitingInput, &self.events);
        }
        true
    }

    /// Whether a reveal task is currently running.
    pub fn is_revealing(&self) -> bool {
        self.lock().reveal.is_some()
    }

    /// Wait until the session leaves `RevealingReply`.
    pub async fn wait_for_reveal(&self) {
        let mut events = self.events.subscribe();
        loop {
            if self.phase() != SessionPhase::RevealingReply {
                return;
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Abort the session, cancelling any reveal and discarding any
    /// in-flight setup or evaluation result.
    ///
    /// Returns `false` if the session had already ended.
    pub fn abort(&self) -> bool {
        let mut inner = self.lock();
        if inner.phase.is_terminal() {
            inner.cancel_reveal();
            return false;
        }
        inner.cancel_reveal();
        inner.set_phase(
            SessionPhase::Aborted {
                reason: AbortReason::Cancelled,
            },
            &self.events,
        );
        let _ = self.events.send(SessionEvent::Aborted {
            reason: AbortReason::Cancelled,
        });
        info!(session = %self.id, turn = inner.state.turn, "Session aborted");
        true
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.cancel_reveal();
    }
}
