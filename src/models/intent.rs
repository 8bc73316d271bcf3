//! Intent classification and pipeline outcome types.

use serde::{Deserialize, Serialize};

/// Classification of what a mention asks for.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Question, greeting, or anything not covered below.
    #[default]
    General,
    /// Request for data held in the application database.
    DatabaseQuery,
    /// Bug report or code change request.
    CodeIssue,
    /// Explicit request to track work.
    TaskCreation,
}

impl Intent {
    /// All variants, in prompt order.
    pub const ALL: [Self; 4] = [
        Self::General,
        Self::DatabaseQuery,
        Self::CodeIssue,
        Self::TaskCreation,
    ];

    /// Tag used in prompts and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::DatabaseQuery => "database_query",
            Self::CodeIssue => "code_issue",
            Self::TaskCreation => "task_creation",
        }
    }

    /// Parse a tag leniently (case, spaces and hyphens ignored).
    ///
    /// Unknown tags yield `None`; callers fall back to [`Intent::General`].
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '.')
            .to_ascii_lowercase()
            .replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
    }

    /// Reply-writing guidance for this intent.
    #[must_use]
    pub fn reply_guidance(self) -> &'static str {
        match self {
            Self::General => "Answer the question or acknowledge the message directly.",
            Self::DatabaseQuery => {
                "Explain what data would answer the request and how it will be looked up; \
                 do not invent figures."
            }
            Self::CodeIssue => {
                "Restate the suspected problem, suggest first diagnostic steps, and say that \
                 it will be tracked if needed."
            }
            Self::TaskCreation => "Confirm the work item and summarise what will be tracked.",
        }
    }
}

/// Result of the analysis step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    /// Classified intent.
    pub intent: Intent,
    /// Short free-text summary of the request.
    pub summary: String,
}

/// Follow-up work item proposed by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Short title (at most 80 characters).
    pub title: String,
    /// Background and goal.
    pub description: String,
    /// Concrete steps.
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Everything the pipeline decided for one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Classified intent.
    pub intent: Intent,
    /// Reply text to post.
    pub reply: String,
    /// Follow-up task, when the evaluation step asked for one.
    pub task: Option<TaskDescriptor>,
}
