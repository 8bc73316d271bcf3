//! Mention repository for `SQLite` persistence.
//!
//! Soft-deleted rows are retained physically but invisible to every
//! read method here.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::envelope::MentionEnvelope;
use crate::models::mention::Mention;
use crate::{AppError, Result};

use super::db::Database;
use super::{parse_optional_time, parse_time};

const COLUMNS: &str =
    "id, type, user_id, channel_id, text, timestamp, event_time, created_at, updated_at, deleted_at";

/// Repository for mention records.
#[derive(Clone)]
pub struct MentionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct MentionRow {
    id: String,
    #[sqlx(rename = "type")]
    kind: String,
    user_id: String,
    channel_id: String,
    text: String,
    timestamp: String,
    event_time: String,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl MentionRow {
    fn into_mention(self) -> Result<Mention> {
        Ok(Mention {
            id: self.id,
            kind: self.kind,
            user_id: self.user_id,
            channel_id: self.channel_id,
            text: self.text,
            timestamp: self.timestamp,
            event_time: parse_time("event_time", &self.event_time)?,
            created_at: parse_time("created_at", &self.created_at)?,
            updated_at: parse_time("updated_at", &self.updated_at)?,
            deleted_at: parse_optional_time("deleted_at", self.deleted_at.as_deref())?,
        })
    }
}

impl MentionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new mention record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails, including when a live
    /// mention with the same `(channel_id, timestamp)` already exists.
    pub async fn create(&self, mention: &Mention) -> Result<Mention> {
        sqlx::query(
            "INSERT INTO mention (id, type, user_id, channel_id, text, timestamp, event_time,
                                  created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&mention.id)
        .bind(&mention.kind)
        .bind(&mention.user_id)
        .bind(&mention.channel_id)
        .bind(&mention.text)
        .bind(&mention.timestamp)
        .bind(mention.event_time.to_rfc3339())
        .bind(mention.created_at.to_rfc3339())
        .bind(mention.updated_at.to_rfc3339())
        .bind(mention.deleted_at.map(|at| at.to_rfc3339()))
        .execute(self.db.as_ref())
        .await?;

        Ok(mention.clone())
    }

    /// Retrieve a live mention by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the mention does not exist or was
    /// soft-deleted.
    pub async fn get_by_id(&self, id: &str) -> Result<Mention> {
        let row: Option<MentionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM mention WHERE id = ?1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.ok_or_else(|| AppError::NotFound(format!("mention {id} not found")))?
            .into_mention()
    }

    /// Look up a live mention by its Slack event identity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_event(&self, channel_id: &str, timestamp: &str) -> Result<Option<Mention>> {
        let row: Option<MentionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM mention
             WHERE channel_id = ?1 AND timestamp = ?2 AND deleted_at IS NULL"
        ))
        .bind(channel_id)
        .bind(timestamp)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(MentionRow::into_mention).transpose()
    }

    /// Return the mention for `envelope`, creating it on first sight.
    ///
    /// Redelivered envelopes resolve to the record created by the first
    /// delivery, so every processing attempt shares one mention id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert or lookup fails.
    pub async fn record(&self, envelope: &MentionEnvelope) -> Result<Mention> {
        let candidate = Mention::from_envelope(envelope);
        sqlx::query(
            "INSERT INTO mention (id, type, user_id, channel_id, text, timestamp, event_time,
                                  created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)
             ON CONFLICT DO NOTHING",
        )
        .bind(&candidate.id)
        .bind(&candidate.kind)
        .bind(&candidate.user_id)
        .bind(&candidate.channel_id)
        .bind(&candidate.text)
        .bind(&candidate.timestamp)
        .bind(candidate.event_time.to_rfc3339())
        .bind(candidate.created_at.to_rfc3339())
        .bind(candidate.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        self.find_by_event(envelope.channel_id(), envelope.timestamp())
            .await?
            .ok_or_else(|| AppError::Db("mention vanished after insert".into()))
    }

    /// Soft-delete a mention and its responses.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no live mention has this id.
    pub async fn soft_delete(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            "UPDATE mention SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("mention {id} not found")));
        }

        sqlx::query(
            "UPDATE mention_response SET deleted_at = ?1, updated_at = ?1
             WHERE mention_id = ?2 AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Soft-delete every live mention created before `before`.
    ///
    /// Returns the number of mentions affected.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn soft_delete_older_than(&self, before: DateTime<Utc>) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let cutoff = before.to_rfc3339();
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "UPDATE mention_response SET deleted_at = ?1, updated_at = ?1
             WHERE deleted_at IS NULL AND mention_id IN
                (SELECT id FROM mention WHERE deleted_at IS NULL AND created_at < ?2)",
        )
        .bind(&now)
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE mention SET deleted_at = ?1, updated_at = ?1
             WHERE deleted_at IS NULL AND created_at < ?2",
        )
        .bind(&now)
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// List the most recent live mentions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<Mention>> {
        let rows: Vec<MentionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM mention WHERE deleted_at IS NULL
             ORDER BY id DESC LIMIT ?1"
        ))
        .bind(i64::from(limit))
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(MentionRow::into_mention).collect()
    }
}
