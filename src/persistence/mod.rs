//! Persistence layer modules.

pub mod db;
pub mod mention_repo;
pub mod response_repo;
pub mod retention;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

use chrono::{DateTime, Utc};

use crate::{AppError, Result};

/// Parse an RFC 3339 column value.
pub(crate) fn parse_time(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {column}: {e}")))
}

/// Parse a nullable RFC 3339 column value.
pub(crate) fn parse_optional_time(
    column: &str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_time(column, s)).transpose()
}
