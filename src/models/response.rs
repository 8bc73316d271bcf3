//! Outcome record for processing one mention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery status of a generated reply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Recorded before the outward Slack call.
    Pending,
    /// Reply was posted.
    Sent,
    /// Posting the reply failed.
    Failed,
}

impl ResponseStatus {
    /// Column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Parse the column representation.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A reply generated for a mention, one row per processing attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MentionResponse {
    /// Time-sortable unique identifier.
    pub id: String,
    /// Owning mention.
    pub mention_id: String,
    /// Reply text.
    pub content: String,
    /// Current delivery status.
    pub status: ResponseStatus,
    /// Identifier of the follow-up task created for this mention, if any.
    pub task_ref: Option<String>,
    /// Set exactly when `status` becomes `Sent`.
    pub sent_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MentionResponse {
    /// Construct a new pending response.
    #[must_use]
    pub fn pending(mention_id: String, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            mention_id,
            content,
            status: ResponseStatus::Pending,
            task_ref: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Determine whether a status transition is permitted.
    ///
    /// Only `pending -> sent` and `pending -> failed` are allowed.
    #[must_use]
    pub fn can_transition_to(&self, next: ResponseStatus) -> bool {
        matches!(
            (self.status, next),
            (
                ResponseStatus::Pending,
                ResponseStatus::Sent | ResponseStatus::Failed
            )
        )
    }
}
