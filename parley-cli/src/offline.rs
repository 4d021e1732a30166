//! Canned generation for `--offline` play
//!
//! Answers scenario, greeting and evaluation requests locally so a quest
//! can be played without network access. Scores are a rough heuristic on
//! the learner's message length.

use parley_models::providers::{ChatRequest, Role, ScriptedProvider, ScriptedReply};
use serde_json::json;

const LEARNER_MARKER: &str = "Learner's latest message: ";

/// A provider answering every request from local heuristics.
pub fn provider() -> ScriptedProvider {
    ScriptedProvider::new().with_responder(respond)
}

fn last_user_message(request: &ChatRequest) -> &str {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

fn respond(request: &ChatRequest) -> ScriptedReply {
    let prompt = last_user_message(request);

    if request.stream {
        return ScriptedReply::Deltas(vec![
            "Hi there! ".to_string(),
            "How can I help you today?".to_string(),
        ]);
    }

    match prompt.split_once(LEARNER_MARKER) {
        Some((_, rest)) => {
            let learner = rest.split("\n\n").next().unwrap_or_default();
            ScriptedReply::text(evaluate(learner))
        }
        None => ScriptedReply::text(scenario(prompt)),
    }
}

fn field<'a>(prompt: &'a str, name: &str) -> Option<&'a str> {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix(name))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn scenario(prompt: &str) -> String {
    let title = field(prompt, "Title:").unwrap_or("Practice");
    let summary = field(prompt, "Summary:").unwrap_or("A short conversation.");
    json!({
        "title": title,
        "description": summary,
        "context": format!("You are chatting with a friendly local about {}.", title),
        "goal": "Keep the conversation going for a few turns.",
        "difficulty": 1
    })
    .to_string()
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

fn evaluate(learner: &str) -> String {
    let words = learner.split_whitespace().count() as u32;
    let score = (55 + words * 5).min(95);
    let disallowed = learner.chars().any(is_cjk);

    let feedback = if words < 4 {
        "Try answering in a full sentence."
    } else {
        "Clear and on topic."
    };

    json!({
        "scores": {
            "communication": score,
            "accuracy": score.saturating_sub(5),
            "scenario": score,
            "fluency": score.saturating_sub(3)
        },
        "feedback": feedback,
        "response": "I see! Tell me more.",
        "hasChinese": disallowed
    })
    .to_string()
}
