//! `SQLite` schema bootstrap logic.
//!
//! All definitions use `IF NOT EXISTS`, so re-running on every startup
//! converges to the same schema.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table and index definitions to the connected database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS mention (
    id              TEXT PRIMARY KEY NOT NULL,
    type            TEXT NOT NULL DEFAULT 'mention',
    user_id         TEXT NOT NULL,
    channel_id      TEXT NOT NULL,
    text            TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    event_time      TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    deleted_at      TEXT
);

CREATE TABLE IF NOT EXISTS mention_response (
    id              TEXT PRIMARY KEY NOT NULL,
    mention_id      TEXT NOT NULL REFERENCES mention(id) ON DELETE CASCADE,
    content         TEXT NOT NULL,
    status          TEXT NOT NULL CHECK(status IN ('pending','sent','failed')),
    task_ref        TEXT,
    sent_at         TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    deleted_at      TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_mention_event
    ON mention(channel_id, timestamp) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_response_mention ON mention_response(mention_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_response_single_active
    ON mention_response(mention_id)
    WHERE status IN ('pending','sent') AND deleted_at IS NULL;
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
