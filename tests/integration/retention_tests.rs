//! Integration tests for the retention sweep.
//!
//! Validates:
//! - Mentions older than the retention window are soft-deleted with
//!   their responses
//! - Recent mentions remain untouched
//! - The background task exits on cancellation

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use mention_relay::models::mention::Mention;
use mention_relay::models::response::MentionResponse;
use mention_relay::persistence::mention_repo::MentionRepo;
use mention_relay::persistence::response_repo::ResponseRepo;
use mention_relay::persistence::{db, retention};

use super::test_helpers::envelope;

async fn create_aged_mention(repo: &MentionRepo, ts: &str, days_ago: i64) -> Mention {
    let mut mention = Mention::from_envelope(&envelope("<@UBOT> old", ts, None));
    mention.created_at = Utc::now() - chrono::Duration::days(days_ago);
    repo.create(&mention).await.expect("create mention")
}

#[tokio::test]
async fn purge_soft_deletes_expired_mentions_and_responses() {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    let mentions = MentionRepo::new(Arc::clone(&database));
    let responses = ResponseRepo::new(Arc::clone(&database));

    let expired = create_aged_mention(&mentions, "1.0", 45).await;
    let recent = create_aged_mention(&mentions, "2.0", 5).await;
    for mention in [&expired, &recent] {
        responses
            .create(&MentionResponse::pending(mention.id.clone(), "reply".into()))
            .await
            .expect("response");
    }

    let affected = retention::purge(&mentions, 30).await.expect("purge");

    assert_eq!(affected, 1);
    assert!(mentions.get_by_id(&expired.id).await.is_err());
    assert!(responses
        .list_for_mention(&expired.id)
        .await
        .expect("list")
        .is_empty());
    assert_eq!(mentions.get_by_id(&recent.id).await.expect("kept").id, recent.id);
    assert_eq!(
        responses.list_for_mention(&recent.id).await.expect("list").len(),
        1
    );

    // A second sweep finds nothing new.
    assert_eq!(retention::purge(&mentions, 30).await.expect("purge"), 0);
}

#[tokio::test]
async fn retention_task_sweeps_on_start_and_stops_on_cancel() {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    let mentions = MentionRepo::new(Arc::clone(&database));
    let expired = create_aged_mention(&mentions, "1.0", 45).await;

    let cancel = CancellationToken::new();
    let handle = retention::spawn_retention_task(Arc::clone(&database), 30, cancel.clone());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while mentions.get_by_id(&expired.id).await.is_ok() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(mentions.get_by_id(&expired.id).await.is_err());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("task stops")
        .expect("task join");
}
