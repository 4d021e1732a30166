//! Concurrency tests for ConversationSession
//!
//! These tests validate the per-session ordering rules:
//! - Concurrent `start` calls share one setup round trip
//! - A submit while a turn is evaluating is rejected, not queued
//! - Abort and new turns stop a running reveal
//! - Results that arrive after an abort are discarded
//! - Learners addressed through the registry do not share state

use std::sync::Arc;
use std::time::Duration;

use parley_core::{
    ConversationSession, Engine, EngineConfig, Rejection, RevealConfig, SeedContent, SessionError,
    SessionEvent, SessionPhase, SessionRegistry, SubmitOutcome,
};
use parley_models::providers::{ScriptedProvider, ScriptedReply};
use serde_json::json;
use tokio::sync::broadcast;

const SCENARIO: &str = r#"Here you go: {"title":"Night market","description":"Buying street food","context":"A crowded stall","goal":"Order two skewers.","difficulty":"beginner"}"#;

fn evaluation(score: u8, reply: &str) -> String {
    json!({
        "scores": {"communication": score, "accuracy": score, "scenario": score, "fluency": score},
        "feedback": "Natural phrasing.",
        "response": reply,
        "hasChinese": false
    })
    .to_string()
}

fn queue_setup(provider: &ScriptedProvider) {
    provider.queue_text(SCENARIO);
    provider.queue(ScriptedReply::Deltas(vec![
        "Character: ".into(),
        "\"Hungry? ".into(),
        "What'll it be?\"".into(),
    ]));
}

fn revealing_config() -> EngineConfig {
    EngineConfig {
        reveal: RevealConfig {
            enabled: true,
            interval_ms: 30,
            chars_per_tick: 1,
        },
        ..EngineConfig::default()
    }
}

fn seed() -> SeedContent {
    SeedContent::new("Night market", "Street food")
}

async fn started(provider: Arc<ScriptedProvider>, config: EngineConfig) -> Arc<ConversationSession> {
    queue_setup(&provider);
    let session = Engine::new(provider, config).new_session();
    session.start(&seed()).await.unwrap();
    session
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn concurrent_start_runs_setup_once() {
    let provider = Arc::new(ScriptedProvider::new().with_delay(Duration::from_millis(50)));
    queue_setup(&provider);
    let engine = Engine::new(provider.clone(), EngineConfig::instant());
    let session = engine.new_session();

    let (seed_a, seed_b) = (seed(), seed());
    let (a, b) = tokio::join!(session.start(&seed_a), session.start(&seed_b));

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);
    assert_eq!(a.title, "Night market");
    // One scenario call and one greeting call
    assert_eq!(provider.call_count(), 2);
    assert!(!engine.is_preparing(&session.id()));

    // Setup messages were applied once
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[1].text, "Hungry? What'll it be?");
}

#[tokio::test(start_paused = true)]
async fn sessions_on_one_engine_prepare_independently() {
    let provider = Arc::new(ScriptedProvider::new().with_delay(Duration::from_millis(20)));
    queue_setup(&provider);
    queue_setup(&provider);
    let engine = Engine::new(provider.clone(), EngineConfig::instant());
    let first = engine.new_session();
    let second = engine.new_session();

    let (seed_a, seed_b) = (seed(), seed());
    let (a, b) = tokio::join!(first.start(&seed_a), second.start(&seed_b));
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(provider.call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn submit_while_evaluating_is_rejected() {
    let provider = Arc::new(ScriptedProvider::new().with_delay(Duration::from_millis(100)));
    let session = started(provider.clone(), EngineConfig::instant()).await;
    provider.queue_text(evaluation(88, "Two skewers, coming up."));
    provider.queue_text(evaluation(10, "unused"));

    let (first, second) = tokio::join!(session.submit_turn("Two skewers please"), async {
        tokio::task::yield_now().await;
        session.submit_turn("And a drink").await
    });

    assert!(first.unwrap().is_accepted());
    assert_eq!(
        second.unwrap(),
        SubmitOutcome::Rejected(Rejection::NotAwaitingInput(SessionPhase::Evaluating))
    );
    assert_eq!(session.state().turn, 1);
    assert_eq!(session.state().running_total, 88);
    // Setup (2) plus one evaluation
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn evaluation_after_abort_is_discarded() {
    let provider = Arc::new(ScriptedProvider::new().with_delay(Duration::from_millis(100)));
    let session = started(provider.clone(), EngineConfig::instant()).await;
    provider.queue_text(evaluation(95, "Great!"));

    let (submitted, aborted) = tokio::join!(session.submit_turn("Two skewers please"), async {
        tokio::task::yield_now().await;
        session.abort()
    });

    assert!(aborted);
    assert!(matches!(submitted, Err(SessionError::Aborted)));
    assert_eq!(session.state().turn, 0);
    assert!(session.state().turn_scores.is_empty());
    assert!(matches!(session.phase(), SessionPhase::Aborted { .. }));
}

#[tokio::test(start_paused = true)]
async fn setup_after_abort_is_discarded() {
    let provider = Arc::new(ScriptedProvider::new().with_delay(Duration::from_millis(100)));
    queue_setup(&provider);
    let session = Engine::new(provider, EngineConfig::instant()).new_session();

    let seed = seed();
    let (started, _) = tokio::join!(session.start(&seed), async {
        tokio::task::yield_now().await;
        session.abort()
    });

    assert!(matches!(started, Err(SessionError::Aborted)));
    assert!(session.messages().is_empty());
    assert!(session.scenario().is_none());
}

#[tokio::test(start_paused = true)]
async fn reveal_completes_and_returns_to_input() {
    let provider = Arc::new(ScriptedProvider::new());
    let session = started(provider.clone(), revealing_config()).await;
    let provider_reply = "Sure thing.";
    provider.queue_text(evaluation(80, provider_reply));
    let mut events = session.subscribe();

    let outcome = session.submit_turn("Two skewers").await.unwrap();
    assert!(outcome.is_accepted());
    assert_eq!(session.phase(), SessionPhase::RevealingReply);

    session.wait_for_reveal().await;
    assert_eq!(session.phase(), SessionPhase::AwaitingInput);
    assert!(!session.is_revealing());

    let frames: Vec<(String, bool)> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::RevealProgress { visible, done, .. } => Some((visible, done)),
            _ => None,
        })
        .collect();
    assert_eq!(frames.len(), provider_reply.chars().count());
    assert_eq!(frames.last().unwrap(), &(provider_reply.to_string(), true));
    assert_eq!(frames[0].0, "S");
}

#[tokio::test(start_paused = true)]
async fn new_turn_cancels_running_reveal() {
    let provider = Arc::new(ScriptedProvider::new());
    let session = started(provider.clone(), revealing_config()).await;
    provider.queue_text(evaluation(80, "A long answer that takes a while to reveal."));
    provider.queue_text(evaluation(90, "Short."));

    let first = session.submit_turn("Two skewers").await.unwrap();
    assert_eq!(session.phase(), SessionPhase::RevealingReply);
    let first_reply_id = session.messages().last().unwrap().id;
    let mut events = session.subscribe();

    tokio::time::sleep(Duration::from_millis(65)).await;
    let second = session.submit_turn("Spicy, please").await.unwrap();
    assert!(first.is_accepted() && second.is_accepted());

    // Let any stale reveal frames surface
    tokio::time::sleep(Duration::from_secs(5)).await;

    let first_reply_frames: Vec<(String, bool)> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::RevealProgress {
                message_id,
                visible,
                done,
            } if message_id == first_reply_id => Some((visible, done)),
            _ => None,
        })
        .collect();

    // Two ticks, then the cut-short frame showing the whole reply
    assert_eq!(first_reply_frames.len(), 3);
    assert_eq!(
        first_reply_frames.last().unwrap(),
        &("A long answer that takes a while to reveal.".to_string(), true)
    );
    assert_eq!(first_reply_frames.iter().filter(|(_, done)| *done).count(), 1);
    assert_eq!(session.state().turn, 2);
    assert_eq!(session.phase(), SessionPhase::AwaitingInput);
}

#[tokio::test(start_paused = true)]
async fn abort_stops_reveal() {
    let provider = Arc::new(ScriptedProvider::new());
    let session = started(provider.clone(), revealing_config()).await;
    provider.queue_text(evaluation(80, "Let me tell you about our skewers."));

    session.submit_turn("What do you have?").await.unwrap();
    tokio::time::sleep(Duration::from_millis(45)).await;
    assert!(session.abort());
    let mut events = session.subscribe();

    tokio::time::sleep(Duration::from_secs(5)).await;
    let late_frames = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, SessionEvent::RevealProgress { .. }))
        .count();
    assert_eq!(late_frames, 0);
    assert!(!session.is_revealing());
    assert!(matches!(session.phase(), SessionPhase::Aborted { .. }));
}

#[tokio::test(start_paused = true)]
async fn skip_reveal_shows_full_reply() {
    let provider = Arc::new(ScriptedProvider::new());
    let session = started(provider.clone(), revealing_config()).await;
    provider.queue_text(evaluation(80, "Enjoy your meal!"));

    session.submit_turn("Thanks").await.unwrap();
    let mut events = session.subscribe();
    assert!(session.skip_reveal());
    assert!(!session.skip_reveal());
    assert_eq!(session.phase(), SessionPhase::AwaitingInput);

    let events = drain(&mut events);
    assert!(events.iter().any(|event| matches!(
        event,
        SessionEvent::RevealProgress { visible, done: true, .. } if visible == "Enjoy your meal!"
    )));
}

#[tokio::test(start_paused = true)]
async fn last_turn_completes_while_reply_reveals() {
    let provider = Arc::new(ScriptedProvider::new());
    let config = EngineConfig {
        max_turns: 1,
        ..revealing_config()
    };
    let session = started(provider.clone(), config).await;
    provider.queue_text(evaluation(85, "Bye now!"));

    let outcome = session.submit_turn("Goodbye").await.unwrap();
    assert_eq!(outcome.report().unwrap().passed, Some(true));
    assert_eq!(session.phase(), SessionPhase::Completed { passed: true });
    assert!(session.is_revealing());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!session.is_revealing());
    assert_eq!(session.phase(), SessionPhase::Completed { passed: true });
}

#[tokio::test]
async fn registry_learners_progress_independently() {
    let provider = Arc::new(ScriptedProvider::new());
    let registry = SessionRegistry::new(Engine::new(provider.clone(), EngineConfig::instant()));

    let alice = registry.create_session().await.id();
    let bob = registry.create_session().await.id();
    for id in [alice, bob] {
        queue_setup(&provider);
        registry.get(&id).await.unwrap().start(&seed()).await.unwrap();
    }

    provider.queue_text(evaluation(90, "Two skewers, coming up."));
    let report = registry.get(&alice).await.unwrap().submit_turn("Two skewers please").await.unwrap();
    assert_eq!(report.report().unwrap().running_total, 90);

    provider.queue_text(evaluation(60, "Sorry?"));
    let report = registry.get(&bob).await.unwrap().submit_turn("Skewer").await.unwrap();
    assert_eq!(report.report().unwrap().running_total, 60);

    registry.remove_session(&alice).await.unwrap();
    assert!(matches!(
        registry.get(&alice).await,
        Err(SessionError::NotFound(_))
    ));

    let bob_session = registry.get(&bob).await.unwrap();
    assert_eq!(bob_session.phase(), SessionPhase::AwaitingInput);
    assert_eq!(bob_session.state().turn_scores, vec![60.0]);
    assert_eq!(registry.list_sessions().await, vec![(bob, SessionPhase::AwaitingInput)]);
}
