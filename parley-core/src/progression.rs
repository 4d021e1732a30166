//! Multi-chapter quest progression
//!
//! ```text
//! Reading(0) -> Practice(0) -> Scoring(0) -> Transition(0, 1) -> Reading(1) ... -> FinalSettlement
//! ```
//!
//! The controller owns one session per chapter attempt and one
//! [`ChapterOutcome`] per settled chapter. Unlike turn submission, calls
//! made in the wrong phase are errors: the controller is driven by program
//! logic, not raw learner input.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::ProgressionError;
use crate::scenario::{Scenario, SeedContent};
use crate::scoring::is_passing;
use crate::session::ConversationSession;

/// An ordered sequence of chapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub title: String,
    pub chapters: Vec<SeedContent>,
}

impl Quest {
    pub fn new(title: impl Into<String>, chapters: Vec<SeedContent>) -> Self {
        Self {
            title: title.into(),
            chapters,
        }
    }
}

/// Settled result of one chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterOutcome {
    pub chapter: usize,
    pub final_score: u32,
    pub passed: bool,
}

/// Outcomes recorded so far and the aggregates derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestProgress {
    outcomes: Vec<ChapterOutcome>,
    chapters: usize,
    pass_score: u32,
}

impl QuestProgress {
    fn new(chapters: usize, pass_score: u32) -> Self {
        Self {
            outcomes: Vec::with_capacity(chapters),
            chapters,
            pass_score,
        }
    }

    pub fn outcomes(&self) -> &[ChapterOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, chapter: usize) -> Option<&ChapterOutcome> {
        self.outcomes.iter().find(|o| o.chapter == chapter)
    }

    /// Sum of settled chapters' final scores
    pub fn aggregate_total(&self) -> u32 {
        self.outcomes.iter().map(|o| o.final_score).sum()
    }

    /// Aggregate total over the quest's chapter count
    pub fn aggregate_average(&self) -> f64 {
        if self.chapters == 0 {
            return 0.0;
        }
        f64::from(self.aggregate_total()) / self.chapters as f64
    }

    pub fn passed(&self) -> bool {
        self.aggregate_average() >= f64::from(self.pass_score)
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.len() == self.chapters
    }
}

/// Final presentation of a quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestSummary {
    pub title: String,
    pub outcomes: Vec<ChapterOutcome>,
    pub aggregate_total: u32,
    pub aggregate_average: f64,
    pub passed: bool,
}

/// Phase of the quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestPhase {
    Reading { chapter: usize },
    Practice { chapter: usize },
    Scoring { chapter: usize },
    Transition { from: usize, to: usize },
    FinalSettlement,
}

impl fmt::Display for QuestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestPhase::Reading { chapter } => write!(f, "Reading({})", chapter),
            QuestPhase::Practice { chapter } => write!(f, "Practice({})", chapter),
            QuestPhase::Scoring { chapter } => write!(f, "Scoring({})", chapter),
            QuestPhase::Transition { from, to } => write!(f, "Transition({} -> {})", from, to),
            QuestPhase::FinalSettlement => f.write_str("FinalSettlement"),
        }
    }
}

/// Result of [`ProgressionController::advance`].
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    NextChapter(usize),
    Settled(QuestSummary),
}

/// Events broadcast by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestEvent {
    PhaseChanged { from: QuestPhase, to: QuestPhase },
    ChapterSettled { outcome: ChapterOutcome },
    ChapterRestarted { chapter: usize },
    QuestSettled { summary: QuestSummary },
}

/// Drives a quest's chapters through their sessions.
pub struct ProgressionController {
    engine: Arc<Engine>,
    quest: Quest,
    phase: QuestPhase,
    progress: QuestProgress,
    session: Option<Arc<ConversationSession>>,
    events: broadcast::Sender<QuestEvent>,
}

impl ProgressionController {
    pub fn new(engine: Arc<Engine>, quest: Quest) -> Result<Self, ProgressionError> {
        if quest.chapters.is_empty() {
            return Err(ProgressionError::EmptyQuest);
        }
        let progress = QuestProgress::new(quest.chapters.len(), engine.config().pass_score);
        let (events, _) = broadcast::channel(engine.config().event_capacity.max(1));
        info!(quest = %quest.title, chapters = quest.chapters.len(), "Quest started");
        Ok(Self {
            engine,
            quest,
            phase: QuestPhase::Reading { chapter: 0 },
            progress,
            session: None,
            events,
        })
    }

    pub fn quest(&self) -> &Quest {
        &self.quest
    }

    pub fn phase(&self) -> QuestPhase {
        self.phase
    }

    pub fn progress(&self) -> &QuestProgress {
        &self.progress
    }

    /// The live session of the chapter in practice, if any
    pub fn session(&self) -> Option<&Arc<ConversationSession>> {
        self.session.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuestEvent> {
        self.events.subscribe()
    }

    /// Index of the chapter the quest is on.
    pub fn current_chapter(&self) -> usize {
        match self.phase {
            QuestPhase::Reading { chapter }
            | QuestPhase::Practice { chapter }
            | QuestPhase::Scoring { chapter } => chapter,
            QuestPhase::Transition { to, .. } => to,
            QuestPhase::FinalSettlement => self.quest.chapters.len() - 1,
        }
    }

    /// Seed content of the current chapter.
    pub fn current_seed(&self) -> &SeedContent {
        &self.quest.chapters[self.current_chapter()]
    }

    fn set_phase(&mut self, to: QuestPhase) {
        let from = std::mem::replace(&mut self.phase, to);
        debug!(from = %from, to = %to, "Quest phase changed");
        let _ = self.events.send(QuestEvent::PhaseChanged { from, to });
    }

    fn invalid_phase(&self, expected: &str) -> ProgressionError {
        ProgressionError::InvalidPhase {
            expected: expected.to_string(),
            actual: self.phase.to_string(),
        }
    }

    /// Leave `Reading` and open a fresh session for the current chapter.
    pub fn begin_practice(&mut self) -> Result<Arc<ConversationSession>, ProgressionError> {
        let QuestPhase::Reading { chapter } = self.phase else {
            return Err(self.invalid_phase("Reading"));
        };
        let session = self.engine.new_session();
        self.session = Some(session.clone());
        self.set_phase(QuestPhase::Practice { chapter });
        info!(chapter, session = %session.id(), "Chapter practice started");
        Ok(session)
    }

    /// [`begin_practice`](Self::begin_practice), then start the session on
    /// the chapter's seed.
    ///
    /// A setup failure leaves the quest in `Practice`; recover with
    /// [`restart_chapter`](Self::restart_chapter).
    pub async fn start_practice(
        &mut self,
    ) -> Result<(Arc<ConversationSession>, Scenario), ProgressionError> {
        let session = self.begin_practice()?;
        let seed = self.current_seed().clone();
        let scenario = session.start(&seed).await?;
        Ok((session, scenario))
    }

    /// Record `final_score` for the chapter in practice.
    pub fn complete_chapter_practice(
        &mut self,
        chapter: usize,
        final_score: u32,
    ) -> Result<ChapterOutcome, ProgressionError> {
        let QuestPhase::Practice { chapter: current } = self.phase else {
            return Err(self.invalid_phase("Practice"));
        };
        if chapter != current {
            return Err(ProgressionError::NotCurrentChapter {
                index: chapter,
                current,
            });
        }

        let outcome = ChapterOutcome {
            chapter,
            final_score,
            passed: is_passing(final_score, self.engine.config().pass_score),
        };
        self.progress.outcomes.push(outcome);
        self.session = None;
        let _ = self.events.send(QuestEvent::ChapterSettled { outcome });
        info!(chapter, final_score, passed = outcome.passed, "Chapter settled");
        self.set_phase(QuestPhase::Scoring { chapter });
        Ok(outcome)
    }

    /// Record the settlement of a completed chapter session.
    ///
    /// Only the session opened by the current practice is accepted, so a
    /// session settles at most one chapter.
    pub fn complete_from_session(
        &mut self,
        session: &ConversationSession,
    ) -> Result<ChapterOutcome, ProgressionError> {
        if !matches!(self.phase, QuestPhase::Practice { .. }) {
            return Err(self.invalid_phase("Practice"));
        }
        if !self.session.as_ref().is_some_and(|s| s.id() == session.id()) {
            return Err(ProgressionError::ForeignSession(session.id()));
        }
        let settlement = session
            .settlement()
            .ok_or(ProgressionError::SessionNotSettled)?;
        let chapter = self.current_chapter();
        self.complete_chapter_practice(chapter, settlement.final_score)
    }

    /// Move past a scored chapter: on to the next one, or settle the quest.
    pub fn advance(&mut self) -> Result<Advance, ProgressionError> {
        let QuestPhase::Scoring { chapter } = self.phase else {
            return Err(self.invalid_phase("Scoring"));
        };

        let next = chapter + 1;
        if next < self.quest.chapters.len() {
            self.set_phase(QuestPhase::Transition {
                from: chapter,
                to: next,
            });
            self.set_phase(QuestPhase::Reading { chapter: next });
            return Ok(Advance::NextChapter(next));
        }

        let summary = self.build_summary();
        self.set_phase(QuestPhase::FinalSettlement);
        let _ = self.events.send(QuestEvent::QuestSettled {
            summary: summary.clone(),
        });
        info!(
            quest = %self.quest.title,
            aggregate_total = summary.aggregate_total,
            aggregate_average = summary.aggregate_average,
            passed = summary.passed,
            "Quest settled"
        );
        Ok(Advance::Settled(summary))
    }

    /// Throw away the current chapter's attempt and read it again.
    ///
    /// Earlier chapters' outcomes are untouched.
    pub fn restart_chapter(&mut self, chapter: usize) -> Result<(), ProgressionError> {
        let chapters = self.quest.chapters.len();
        if chapter >= chapters {
            return Err(ProgressionError::ChapterOutOfRange {
                index: chapter,
                chapters,
            });
        }
        if self.phase == QuestPhase::FinalSettlement {
            return Err(self.invalid_phase("a chapter in progress"));
        }
        let current = self.current_chapter();
        if chapter != current {
            return Err(ProgressionError::NotCurrentChapter {
                index: chapter,
                current,
            });
        }

        if let Some(session) = self.session.take() {
            session.abort();
        }
        self.progress.outcomes.retain(|o| o.chapter != chapter);
        let _ = self.events.send(QuestEvent::ChapterRestarted { chapter });
        info!(chapter, "Chapter restarted");
        self.set_phase(QuestPhase::Reading { chapter });
        Ok(())
    }

    /// Quest summary, once settled.
    pub fn summary(&self) -> Option<QuestSummary> {
        (self.phase == QuestPhase::FinalSettlement).then(|| self.build_summary())
    }

    fn build_summary(&self) -> QuestSummary {
        QuestSummary {
            title: self.quest.title.clone(),
            outcomes: self.progress.outcomes.clone(),
            aggregate_total: self.progress.aggregate_total(),
            aggregate_average: self.progress.aggregate_average(),
            passed: self.progress.passed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::SessionError;
    use crate::session::SessionPhase;
    use parley_models::providers::ScriptedProvider;

    fn quest(chapters: usize) -> Quest {
        Quest::new(
            "Travel",
            (0..chapters)
                .map(|i| SeedContent::new(format!("Chapter {}", i), "A trip"))
                .collect(),
        )
    }

    fn controller(chapters: usize) -> ProgressionController {
        let engine = Engine::new(Arc::new(ScriptedProvider::new()), EngineConfig::instant());
        ProgressionController::new(engine, quest(chapters)).unwrap()
    }

    fn settle(controller: &mut ProgressionController, score: u32) -> Advance {
        let chapter = controller.current_chapter();
        controller.begin_practice().unwrap();
        controller.complete_chapter_practice(chapter, score).unwrap();
        controller.advance().unwrap()
    }

    fn rounded(value: f64) -> f64 {
        (value * 100.0).round() / 100.0
    }

    #[test]
    fn empty_quest_is_rejected() {
        let engine = Engine::new(Arc::new(ScriptedProvider::new()), EngineConfig::instant());
        let err = ProgressionController::new(engine, quest(0)).err().unwrap();
        assert!(matches!(err, ProgressionError::EmptyQuest));
    }

    #[test]
    fn starts_reading_first_chapter() {
        let controller = controller(2);
        assert_eq!(controller.phase(), QuestPhase::Reading { chapter: 0 });
        assert_eq!(controller.current_seed().title, "Chapter 0");
        assert!(controller.session().is_none());
    }

    #[test]
    fn three_chapters_passing_average() {
        let mut controller = controller(3);
        assert_eq!(settle(&mut controller, 90), Advance::NextChapter(1));
        assert_eq!(settle(&mut controller, 70), Advance::NextChapter(2));

        let Advance::Settled(summary) = settle(&mut controller, 85) else {
            panic!("expected settlement");
        };
        assert_eq!(summary.aggregate_total, 245);
        assert_eq!(rounded(summary.aggregate_average), 81.67);
        assert!(summary.passed);
        assert_eq!(controller.phase(), QuestPhase::FinalSettlement);
        assert_eq!(controller.summary(), Some(summary));
    }

    #[test]
    fn three_chapters_failing_average() {
        let mut controller = controller(3);
        settle(&mut controller, 90);
        settle(&mut controller, 50);
        let Advance::Settled(summary) = settle(&mut controller, 85) else {
            panic!("expected settlement");
        };
        assert_eq!(summary.aggregate_average, 75.0);
        assert!(!summary.passed);
        assert!(!summary.outcomes[1].passed);
    }

    #[test]
    fn chapter_pass_boundary() {
        let mut controller = controller(2);
        controller.begin_practice().unwrap();
        assert!(!controller.complete_chapter_practice(0, 79).unwrap().passed);
        controller.advance().unwrap();
        controller.begin_practice().unwrap();
        assert!(controller.complete_chapter_practice(1, 80).unwrap().passed);
    }

    #[test]
    fn wrong_phase_calls_are_errors() {
        let mut controller = controller(2);
        assert!(matches!(
            controller.complete_chapter_practice(0, 90),
            Err(ProgressionError::InvalidPhase { .. })
        ));
        assert!(matches!(
            controller.advance(),
            Err(ProgressionError::InvalidPhase { .. })
        ));

        controller.begin_practice().unwrap();
        assert!(matches!(
            controller.begin_practice(),
            Err(ProgressionError::InvalidPhase { .. })
        ));
        assert!(matches!(
            controller.complete_chapter_practice(1, 90),
            Err(ProgressionError::NotCurrentChapter { index: 1, current: 0 })
        ));
    }

    #[test]
    fn chapter_cannot_settle_twice() {
        let mut controller = controller(2);
        controller.begin_practice().unwrap();
        controller.complete_chapter_practice(0, 88).unwrap();
        assert!(controller.complete_chapter_practice(0, 95).is_err());
        assert_eq!(controller.progress().outcomes().len(), 1);
    }

    #[test]
    fn restart_discards_unsettled_outcome_only() {
        let mut controller = controller(3);
        settle(&mut controller, 90);

        controller.begin_practice().unwrap();
        controller.complete_chapter_practice(1, 40).unwrap();
        controller.restart_chapter(1).unwrap();

        assert_eq!(controller.phase(), QuestPhase::Reading { chapter: 1 });
        assert_eq!(controller.progress().outcomes().len(), 1);
        assert_eq!(controller.progress().outcome(0).unwrap().final_score, 90);
    }

    #[test]
    fn restart_aborts_live_session() {
        let mut controller = controller(1);
        let session = controller.begin_practice().unwrap();
        controller.restart_chapter(0).unwrap();

        assert!(matches!(session.phase(), SessionPhase::Aborted { .. }));
        assert!(controller.session().is_none());

        let fresh = controller.begin_practice().unwrap();
        assert_ne!(fresh.id(), session.id());
    }

    #[test]
    fn restart_rejects_other_chapters_and_settled_quest() {
        let mut controller = controller(2);
        assert!(matches!(
            controller.restart_chapter(1),
            Err(ProgressionError::NotCurrentChapter { index: 1, current: 0 })
        ));
        assert!(matches!(
            controller.restart_chapter(5),
            Err(ProgressionError::ChapterOutOfRange { index: 5, chapters: 2 })
        ));

        settle(&mut controller, 90);
        settle(&mut controller, 90);
        assert!(matches!(
            controller.restart_chapter(1),
            Err(ProgressionError::InvalidPhase { .. })
        ));
    }

    #[test]
    fn complete_from_unsettled_session_fails() {
        let mut controller = controller(1);
        let session = controller.begin_practice().unwrap();
        let err = controller.complete_from_session(&session).unwrap_err();
        assert!(matches!(err, ProgressionError::SessionNotSettled));
    }

    #[tokio::test]
    async fn setup_failure_surfaces_as_session_error() {
        let mut controller = controller(1);
        let err = controller.start_practice().await.err().unwrap();
        assert!(matches!(
            err,
            ProgressionError::Session(SessionError::ScenarioGeneration(_))
        ));
        assert_eq!(controller.phase(), QuestPhase::Practice { chapter: 0 });
        controller.restart_chapter(0).unwrap();
    }

    #[test]
    fn advance_broadcasts_transition() {
        let mut controller = controller(2);
        let mut events = controller.subscribe();
        settle(&mut controller, 85);

        let mut phases = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let QuestEvent::PhaseChanged { to, .. } = event {
                phases.push(to);
            }
        }
        assert_eq!(
            phases,
            vec![
                QuestPhase::Practice { chapter: 0 },
                QuestPhase::Scoring { chapter: 0 },
                QuestPhase::Transition { from: 0, to: 1 },
                QuestPhase::Reading { chapter: 1 },
            ]
        );
    }
}
