//! Mention response repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::response::{MentionResponse, ResponseStatus};
use crate::{AppError, Result};

use super::db::Database;
use super::{parse_optional_time, parse_time};

const COLUMNS: &str =
    "id, mention_id, content, status, task_ref, sent_at, created_at, updated_at, deleted_at";

/// Repository for mention response records.
#[derive(Clone)]
pub struct ResponseRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ResponseRow {
    id: String,
    mention_id: String,
    content: String,
    status: String,
    task_ref: Option<String>,
    sent_at: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl ResponseRow {
    fn into_response(self) -> Result<MentionResponse> {
        let status = ResponseStatus::parse(&self.status)
            .ok_or_else(|| AppError::Db(format!("invalid response status: {}", self.status)))?;
        Ok(MentionResponse {
            id: self.id,
            mention_id: self.mention_id,
            content: self.content,
            status,
            task_ref: self.task_ref,
            sent_at: parse_optional_time("sent_at", self.sent_at.as_deref())?,
            created_at: parse_time("created_at", &self.created_at)?,
            updated_at: parse_time("updated_at", &self.updated_at)?,
            deleted_at: parse_optional_time("deleted_at", self.deleted_at.as_deref())?,
        })
    }
}

impl ResponseRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new response record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails, for example when the
    /// owning mention does not exist or already has a `pending` or `sent`
    /// response.
    pub async fn create(&self, response: &MentionResponse) -> Result<MentionResponse> {
        sqlx::query(
            "INSERT INTO mention_response (id, mention_id, content, status, task_ref, sent_at,
                                           created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&response.id)
        .bind(&response.mention_id)
        .bind(&response.content)
        .bind(response.status.as_str())
        .bind(&response.task_ref)
        .bind(response.sent_at.map(|at| at.to_rfc3339()))
        .bind(response.created_at.to_rfc3339())
        .bind(response.updated_at.to_rfc3339())
        .bind(response.deleted_at.map(|at| at.to_rfc3339()))
        .execute(self.db.as_ref())
        .await?;

        Ok(response.clone())
    }

    /// Claim a mention for one processing attempt by inserting a `pending`
    /// response.
    ///
    /// At most one `pending` or `sent` response may exist per mention, so
    /// concurrent attempts race on the insert and exactly one wins. A
    /// `pending` claim last touched before `stale_before` belongs to an
    /// abandoned attempt; it is marked `failed` and taken over.
    ///
    /// Returns `None` when the mention is already answered or held by a
    /// live attempt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the transaction fails.
    pub async fn claim(
        &self,
        mention_id: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<MentionResponse>> {
        let candidate = MentionResponse::pending(mention_id.to_owned(), String::new());
        let now = Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await?;

        let released = sqlx::query(
            "UPDATE mention_response SET status = 'failed', updated_at = ?1
             WHERE mention_id = ?2 AND status = 'pending' AND deleted_at IS NULL
               AND updated_at < ?3",
        )
        .bind(&now)
        .bind(mention_id)
        .bind(stale_before.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        if released.rows_affected() > 0 {
            warn!(mention_id, "taking over stale processing claim");
        }

        let inserted = sqlx::query(
            "INSERT INTO mention_response (id, mention_id, content, status, task_ref, sent_at,
                                           created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, 'pending', NULL, NULL, ?4, ?5, NULL)
             ON CONFLICT DO NOTHING",
        )
        .bind(&candidate.id)
        .bind(&candidate.mention_id)
        .bind(&candidate.content)
        .bind(candidate.created_at.to_rfc3339())
        .bind(candidate.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((inserted.rows_affected() == 1).then_some(candidate))
    }

    /// Store the reply text on a pending response.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no pending response has this id.
    pub async fn set_content(&self, id: &str, content: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE mention_response SET content = ?1, updated_at = ?2
             WHERE id = ?3 AND status = 'pending' AND deleted_at IS NULL",
        )
        .bind(content)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("pending response {id} not found")));
        }
        Ok(())
    }

    /// Retrieve a live response by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the response does not exist.
    pub async fn get_by_id(&self, id: &str) -> Result<MentionResponse> {
        let row: Option<ResponseRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM mention_response WHERE id = ?1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.ok_or_else(|| AppError::NotFound(format!("response {id} not found")))?
            .into_response()
    }

    /// Transition a pending response to `sent` and stamp `sent_at`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` if the response is not pending.
    pub async fn mark_sent(&self, id: &str) -> Result<MentionResponse> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE mention_response SET status = 'sent', sent_at = ?1, updated_at = ?1
             WHERE id = ?2 AND status = 'pending' AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        self.after_transition(id, ResponseStatus::Sent, result.rows_affected())
            .await
    }

    /// Transition a pending response to `failed`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` if the response is not pending.
    pub async fn mark_failed(&self, id: &str) -> Result<MentionResponse> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE mention_response SET status = 'failed', updated_at = ?1
             WHERE id = ?2 AND status = 'pending' AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        self.after_transition(id, ResponseStatus::Failed, result.rows_affected())
            .await
    }

    /// Record the follow-up task created for a response.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the response does not exist.
    pub async fn set_task_ref(&self, id: &str, task_ref: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE mention_response SET task_ref = ?1, updated_at = ?2
             WHERE id = ?3 AND deleted_at IS NULL",
        )
        .bind(task_ref)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("response {id} not found")));
        }
        Ok(())
    }

    /// The `sent` response for a mention, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_sent_for_mention(&self, mention_id: &str) -> Result<Option<MentionResponse>> {
        let row: Option<ResponseRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM mention_response
             WHERE mention_id = ?1 AND status = 'sent' AND deleted_at IS NULL
             LIMIT 1"
        ))
        .bind(mention_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ResponseRow::into_response).transpose()
    }

    /// The most recent task reference recorded by any attempt for a mention.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn latest_task_ref(&self, mention_id: &str) -> Result<Option<String>> {
        let task_ref: Option<String> = sqlx::query_scalar(
            "SELECT task_ref FROM mention_response
             WHERE mention_id = ?1 AND task_ref IS NOT NULL AND deleted_at IS NULL
             ORDER BY id DESC LIMIT 1",
        )
        .bind(mention_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        Ok(task_ref)
    }

    /// All live responses for a mention, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_mention(&self, mention_id: &str) -> Result<Vec<MentionResponse>> {
        let rows: Vec<ResponseRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM mention_response
             WHERE mention_id = ?1 AND deleted_at IS NULL
             ORDER BY id ASC"
        ))
        .bind(mention_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ResponseRow::into_response).collect()
    }

    async fn after_transition(
        &self,
        id: &str,
        next: ResponseStatus,
        rows_affected: u64,
    ) -> Result<MentionResponse> {
        if rows_affected == 0 {
            let current = self.get_by_id(id).await?;
            return Err(AppError::InvalidTransition(format!(
                "response {id} cannot move from {} to {}",
                current.status.as_str(),
                next.as_str()
            )));
        }
        self.get_by_id(id).await
    }
}
