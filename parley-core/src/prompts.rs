//! Prompt construction for the generation service.
//!
//! The wording here is not load-bearing; the JSON shapes requested are what
//! the generators parse.

use parley_models::providers::Message as ChatMessage;

use crate::scenario::{Scenario, SeedContent};
use crate::session::{Message, Speaker};

/// Cap on conversation lines forwarded to the evaluator.
const HISTORY_WINDOW: usize = 12;

pub fn scenario_messages(seed: &SeedContent) -> Vec<ChatMessage> {
    let tags = if seed.tags.is_empty() {
        "none".to_string()
    } else {
        seed.tags.join(", ")
    };

    vec![
        ChatMessage::system(
            "You design short role-play scenarios for English speaking practice. \
             Reply with a single JSON object and nothing else.",
        ),
        ChatMessage::user(format!(
            "Create a conversation scenario inspired by this content.\n\
             Title: {}\nSummary: {}\nTags: {}\n\n\
             Return JSON with keys:\n\
             \"title\" (short), \"description\" (one sentence), \
             \"context\" (who the learner is talking to and where), \
             \"goal\" (what the learner must achieve), \
             \"difficulty\" (1 = beginner, 2 = intermediate, 3 = advanced).",
            seed.title, seed.summary, tags
        )),
    ]
}

pub fn greeting_messages(scenario: &Scenario) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You are the other person in this scenario. Stay in character.\n\
             Scenario: {}\nContext: {}\nLearner's goal: {}",
            scenario.title, scenario.context, scenario.goal
        )),
        ChatMessage::user(
            "Open the conversation with one or two natural sentences. \
             Output only what your character says.",
        ),
    ]
}

pub fn evaluation_messages(
    user_text: &str,
    scenario: &Scenario,
    history: &[Message],
    past_scores: &[f64],
) -> Vec<ChatMessage> {
    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    let transcript = recent
        .iter()
        .filter(|m| m.speaker != Speaker::System)
        .map(|m| format!("{}: {}", m.speaker.label(), m.text))
        .collect::<Vec<_>>()
        .join("\n");

    let past = if past_scores.is_empty() {
        "none yet".to_string()
    } else {
        past_scores
            .iter()
            .map(|s| format!("{:.0}", s))
            .collect::<Vec<_>>()
            .join(", ")
    };

    vec![
        ChatMessage::system(format!(
            "You are both the character in a role-play and an English speaking examiner.\n\
             Scenario: {}\nContext: {}\nLearner's goal: {}\n\
             Reply with a single JSON object and nothing else.",
            scenario.title, scenario.context, scenario.goal
        )),
        ChatMessage::user(format!(
            "Conversation so far:\n{}\n\nPrevious turn scores: {}\n\n\
             Learner's latest message: {}\n\n\
             Return JSON: {{\"scores\": {{\"communication\": 0-100, \"accuracy\": 0-100, \
             \"scenario\": 0-100, \"fluency\": 0-100}}, \"feedback\": \"one or two sentences\", \
             \"response\": \"your in-character reply\", \
             \"hasChinese\": true if the learner used Chinese or another non-English language}}",
            transcript, past, user_text
        )),
    ]
}
