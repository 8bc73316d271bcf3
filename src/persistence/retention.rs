//! Retention service for time-based soft deletion.
//!
//! Runs as a background task that soft-deletes mentions (and their
//! responses) older than `retention_days`. Rows are never removed
//! physically.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::db::Database;
use super::mention_repo::MentionRepo;
use crate::Result;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the retention background task.
///
/// The task runs hourly, starting immediately.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    retention_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let repo = MentionRepo::new(db);
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = purge(&repo, retention_days).await {
                        error!(?err, "retention sweep failed");
                    }
                }
            }
        }
    })
}

/// Soft-delete everything older than `retention_days`.
///
/// Returns the number of mentions affected.
///
/// # Errors
///
/// Returns `AppError::Db` if the update fails.
pub async fn purge(repo: &MentionRepo, retention_days: u32) -> Result<u64> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    let affected = repo.soft_delete_older_than(cutoff).await?;
    info!(retention_days, affected, "retention sweep completed");
    Ok(affected)
}
