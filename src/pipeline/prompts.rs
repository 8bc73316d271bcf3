//! Prompt builders for each pipeline step.
//!
//! Every step asks for a line-oriented or JSON answer so that parsing
//! stays independent of model phrasing.

use crate::models::intent::{Analysis, Intent};

use super::llm::CompletionRequest;

const ASSISTANT_ROLE: &str =
    "You are an assistant that reads Slack mentions addressed to a team bot.";

/// Classify the mention into one intent tag plus a summary.
#[must_use]
pub fn analysis(text: &str) -> CompletionRequest {
    let tags = Intent::ALL
        .iter()
        .map(|intent| intent.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let system = format!(
        "{ASSISTANT_ROLE} Classify the request. Answer with exactly two lines:\n\
         intent: <one of {tags}>\n\
         summary: <one sentence describing what the user wants>"
    );
    CompletionRequest::new(system, format!("Mention:\n{text}"))
}

/// Write the Slack reply.
#[must_use]
pub fn reply(user_id: &str, text: &str, analysis: &Analysis) -> CompletionRequest {
    let system = format!(
        "{ASSISTANT_ROLE} Write a short, friendly Slack reply of at most 200 characters. \
         Start the reply with <@{user_id}>. {}",
        analysis.intent.reply_guidance()
    );
    let prompt = format!(
        "Mention:\n{text}\n\nIntent: {}\nSummary: {}",
        analysis.intent.as_str(),
        analysis.summary
    );
    CompletionRequest::new(system, prompt)
}

/// Decide whether a follow-up task should be tracked.
#[must_use]
pub fn evaluation(text: &str, analysis: &Analysis) -> CompletionRequest {
    let system = format!(
        "{ASSISTANT_ROLE} Decide whether the request needs a follow-up task in the team's \
         task tracker (work that cannot be finished by replying). Answer with exactly two lines:\n\
         needs_task: <true or false>\n\
         reason: <one sentence>"
    );
    let prompt = format!(
        "Mention:\n{text}\n\nIntent: {}\nSummary: {}",
        analysis.intent.as_str(),
        analysis.summary
    );
    CompletionRequest::new(system, prompt)
}

/// Draft the follow-up task as JSON.
#[must_use]
pub fn task(text: &str, analysis: &Analysis) -> CompletionRequest {
    let system = format!(
        "{ASSISTANT_ROLE} Draft a task for the team's tracker. Answer with a single JSON \
         object and nothing else:\n\
         {{\"title\": \"<at most 80 characters>\", \"description\": \"<background and goal>\", \
         \"steps\": [\"<concrete step>\", \"...\"]}}"
    );
    let prompt = format!(
        "Mention:\n{text}\n\nIntent: {}\nSummary: {}",
        analysis.intent.as_str(),
        analysis.summary
    );
    CompletionRequest::new(system, prompt)
}
