//! Mention history record.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::envelope::MentionEnvelope;

/// Record kind stored in the `type` column.
pub const MENTION_KIND: &str = "mention";

/// A received Slack mention kept for audit and deduplication.
///
/// `id` is a `UUIDv7`, so ids sort in creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Mention {
    /// Time-sortable unique identifier.
    pub id: String,
    /// Record kind, always [`MENTION_KIND`] for now.
    pub kind: String,
    /// Mentioning user.
    pub user_id: String,
    /// Channel of the mention.
    pub channel_id: String,
    /// Message text.
    pub text: String,
    /// Slack event timestamp (`ts`), unique within a channel.
    pub timestamp: String,
    /// Wall-clock time of the event, derived from `timestamp`.
    pub event_time: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Mention {
    /// Construct a new mention record from a validated envelope.
    #[must_use]
    pub fn from_envelope(envelope: &MentionEnvelope) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            kind: MENTION_KIND.to_owned(),
            user_id: envelope.user_id().to_owned(),
            channel_id: envelope.channel_id().to_owned(),
            text: envelope.text().to_owned(),
            timestamp: envelope.timestamp().to_owned(),
            event_time: parse_slack_ts(envelope.timestamp()).unwrap_or(now),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether the record has been soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Convert a Slack `ts` (`"1617262456.000200"`) into a UTC instant.
#[must_use]
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs.parse().ok()?;
    let digits: String = frac.chars().take(9).collect();
    let padded = format!("{digits:0<9}");
    let nanos: u32 = padded.parse().ok()?;
    Utc.timestamp_opt(secs, nanos).single()
}
