//! Parsers for model answers.
//!
//! All parsers are total: a malformed answer degrades to a default rather
//! than failing the message.

use crate::models::intent::{Analysis, Intent, TaskDescriptor};

/// Maximum task title length, in characters.
pub const MAX_TITLE_CHARS: usize = 80;
const MAX_SUMMARY_CHARS: usize = 200;
const FALLBACK_TITLE: &str = "Follow up on Slack mention";

/// Truncate to at most `max` characters without splitting a code point.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn field<'a>(raw: &'a str, key: &str) -> Option<&'a str> {
    raw.lines().find_map(|line| {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        let (name, value) = line.split_once(':')?;
        name.trim()
            .trim_matches('*')
            .eq_ignore_ascii_case(key)
            .then(|| value.trim())
    })
}

/// Parse `intent:` / `summary:` lines.
///
/// Unknown or missing intents fall back to [`Intent::General`]; a missing
/// summary falls back to the (truncated) raw answer.
#[must_use]
pub fn parse_analysis(raw: &str) -> Analysis {
    let intent = field(raw, "intent")
        .and_then(Intent::parse)
        .unwrap_or_default();
    let summary = field(raw, "summary")
        .filter(|s| !s.is_empty())
        .map_or_else(|| truncate_chars(raw.trim(), MAX_SUMMARY_CHARS), str::to_owned);
    Analysis { intent, summary }
}

/// Parse the `needs_task:` line. Anything other than an affirmative
/// answer means no task.
#[must_use]
pub fn parse_needs_task(raw: &str) -> bool {
    field(raw, "needs_task").is_some_and(|value| {
        let value = value
            .trim_matches(|c: char| c == '`' || c == '"' || c == '.')
            .to_ascii_lowercase();
        matches!(value.as_str(), "true" | "yes")
    })
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn json_object(raw: &str) -> Option<&str> {
    let body = strip_fences(raw);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

/// Parse a task JSON answer, falling back to a task built from
/// `mention_text` when the answer is unusable.
#[must_use]
pub fn parse_task(raw: &str, mention_text: &str) -> TaskDescriptor {
    let parsed = json_object(raw)
        .and_then(|json| serde_json::from_str::<TaskDescriptor>(json).ok())
        .filter(|task| !task.title.trim().is_empty());

    match parsed {
        Some(mut task) => {
            task.title = truncate_chars(task.title.trim(), MAX_TITLE_CHARS);
            task.steps.retain(|step| !step.trim().is_empty());
            task
        }
        None => fallback_task(mention_text),
    }
}

/// Generic task for a mention whose task draft could not be parsed.
#[must_use]
pub fn fallback_task(mention_text: &str) -> TaskDescriptor {
    let first_line = mention_text.lines().next().unwrap_or_default().trim();
    let title = if first_line.is_empty() {
        FALLBACK_TITLE.to_owned()
    } else {
        truncate_chars(first_line, MAX_TITLE_CHARS)
    };
    TaskDescriptor {
        title,
        description: mention_text.trim().to_owned(),
        steps: Vec::new(),
    }
}
