//! Integration tests for the mention consumer.
//!
//! Validates:
//! - Completed messages produce one reply and are deleted
//! - Reply anchoring for threaded, unthreaded and reply-in-thread cases
//! - Pipeline and reply failures leave the message for redelivery
//! - Redelivery after a sent reply is acknowledged without reposting
//! - Copies of one mention processed concurrently post a single reply
//! - A live processing claim defers other attempts; a stale one is taken over
//! - Undecodable bodies go straight to the dead-letter queue; a failed
//!   delete afterwards is an error, not a dead-lettered outcome
//! - Follow-up tasks are created once and reused across attempts

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use mention_relay::dispatch::{TaskDispatcher, TaskStore};
use mention_relay::models::response::{MentionResponse, ResponseStatus};
use mention_relay::persistence::mention_repo::MentionRepo;
use mention_relay::persistence::response_repo::ResponseRepo;
use mention_relay::queue::ReceiveOptions;
use mention_relay::relay::consumer::{spawn_consumer, ProcessOutcome};
use mention_relay::AppError;

use super::test_helpers::{
    envelope, receive_options, DeleteFailingQueue, FakeChat, FakeLlm, FakeTasks, Harness,
    CODE_ISSUE_WITH_TASK, GENERAL_NO_TASK,
};

async fn responses_for(harness: &Harness, ts: &str) -> Vec<MentionResponse> {
    let mention = MentionRepo::new(Arc::clone(&harness.db))
        .find_by_event("C1", ts)
        .await
        .expect("query")
        .expect("mention recorded");
    ResponseRepo::new(Arc::clone(&harness.db))
        .list_for_mention(&mention.id)
        .await
        .expect("responses")
}

// ─── Happy path and anchoring ──────────────────────────────

#[tokio::test]
async fn unthreaded_mention_gets_top_level_reply_and_is_deleted() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&GENERAL_NO_TASK)).await;
    harness
        .send(r#"{"text":"<@UBOT> fix this","user":"U1","channel":"C1","ts":"100.1","thread_ts":""}"#)
        .await;

    let received = harness.consumer().poll_once().await.expect("poll");

    assert_eq!(received, 1);
    let posted = harness.chat.posted();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].channel, "C1");
    assert_eq!(posted[0].thread_ts, None);
    assert!(posted[0].text.starts_with("<@U1>"), "{}", posted[0].text);
    assert_eq!(harness.llm.calls(), 3);
    assert_eq!(harness.queue.approximate_len(&harness.urls.primary).await, 0);

    let responses = responses_for(&harness, "100.1").await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, ResponseStatus::Sent);
    assert!(responses[0].sent_at.is_some());
}

#[tokio::test]
async fn threaded_mention_replies_in_its_thread() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&GENERAL_NO_TASK)).await;
    harness
        .send_envelope(&envelope("<@UBOT> status?", "100.2", Some("99.0")))
        .await;

    let message = harness.receive_one().await;
    let outcome = harness.consumer().handle_message(&message).await.expect("handled");

    assert_eq!(outcome, ProcessOutcome::Completed);
    assert_eq!(harness.chat.posted()[0].thread_ts.as_deref(), Some("99.0"));
}

#[tokio::test]
async fn reply_in_thread_anchors_under_the_mention() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&GENERAL_NO_TASK)).await;
    harness.send_envelope(&envelope("<@UBOT> hi", "100.3", None)).await;

    let message = harness.receive_one().await;
    harness
        .consumer()
        .with_reply_in_thread(true)
        .handle_message(&message)
        .await
        .expect("handled");

    assert_eq!(harness.chat.posted()[0].thread_ts.as_deref(), Some("100.3"));
}

// ─── Failure handling ──────────────────────────────────────

#[tokio::test]
async fn pipeline_failure_leaves_message_for_redelivery() {
    let llm = FakeLlm::scripted(&[]);
    llm.push_error();
    let harness = Harness::new(FakeChat::new(), llm).await;
    harness.send_envelope(&envelope("<@UBOT> fix this", "100.1", None)).await;

    let message = harness.receive_one().await;
    let consumer = harness.consumer();
    assert!(consumer.handle_message(&message).await.is_err());

    assert!(harness.chat.posted().is_empty());
    assert_eq!(harness.queue.approximate_len(&harness.urls.primary).await, 1);
    let responses = responses_for(&harness, "100.1").await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, ResponseStatus::Failed);

    // Same delivery retried once the model recovers.
    harness.llm.push(&GENERAL_NO_TASK);
    let outcome = consumer.handle_message(&message).await.expect("retry");
    assert_eq!(outcome, ProcessOutcome::Completed);
    assert_eq!(harness.chat.posted().len(), 1);
    assert_eq!(harness.queue.approximate_len(&harness.urls.primary).await, 0);
}

#[tokio::test]
async fn failed_reply_is_recorded_and_message_kept() {
    let harness = Harness::new(FakeChat::failing(), FakeLlm::scripted(&GENERAL_NO_TASK)).await;
    harness.send_envelope(&envelope("<@UBOT> fix this", "100.1", None)).await;

    let message = harness.receive_one().await;
    assert!(harness.consumer().handle_message(&message).await.is_err());

    let responses = responses_for(&harness, "100.1").await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, ResponseStatus::Failed);
    assert_eq!(harness.queue.approximate_len(&harness.urls.primary).await, 1);
}

#[tokio::test]
async fn redelivery_after_sent_reply_does_not_post_again() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&GENERAL_NO_TASK)).await;
    let mention = envelope("<@UBOT> fix this", "100.1", None);
    harness.send_envelope(&mention).await;
    harness.send_envelope(&mention).await;

    let consumer = harness.consumer();
    let batch = harness.receive_all().await;
    let mut outcomes = Vec::new();
    for message in &batch {
        outcomes.push(consumer.handle_message(message).await.expect("handled"));
    }

    assert_eq!(
        outcomes,
        vec![ProcessOutcome::Completed, ProcessOutcome::Duplicate]
    );
    assert_eq!(harness.chat.posted().len(), 1);
    assert_eq!(harness.llm.calls(), 3);
    let responses = responses_for(&harness, "100.1").await;
    assert_eq!(responses.len(), 1);
    assert_eq!(harness.queue.approximate_len(&harness.urls.primary).await, 0);
}

#[tokio::test]
async fn duplicate_copies_in_one_batch_post_once() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&GENERAL_NO_TASK)).await;
    let mention = envelope("<@UBOT> fix this", "100.1", None);
    harness.send_envelope(&mention).await;
    harness.send_envelope(&mention).await;

    let consumer = harness.consumer();
    let batch = harness.receive_all().await;
    assert_eq!(batch.len(), 2);
    consumer.process_batch(&batch).await;

    assert_eq!(harness.chat.posted().len(), 1);
    assert_eq!(harness.llm.calls(), 3);
    let responses = responses_for(&harness, "100.1").await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, ResponseStatus::Sent);

    // Whichever copy was deferred is acknowledged once it comes back.
    for message in &batch {
        let outcome = consumer.handle_message(message).await.expect("handled");
        assert_eq!(outcome, ProcessOutcome::Duplicate);
    }
    assert_eq!(harness.chat.posted().len(), 1);
    assert_eq!(harness.queue.approximate_len(&harness.urls.primary).await, 0);
}

#[tokio::test]
async fn live_claim_defers_other_attempts() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&GENERAL_NO_TASK)).await;
    harness.send_envelope(&envelope("<@UBOT> fix this", "100.1", None)).await;
    let message = harness.receive_one().await;

    let mention = MentionRepo::new(Arc::clone(&harness.db))
        .record(&envelope("<@UBOT> fix this", "100.1", None))
        .await
        .expect("record");
    let responses = ResponseRepo::new(Arc::clone(&harness.db));
    let held = responses
        .claim(&mention.id, chrono::Utc::now() - chrono::Duration::hours(1))
        .await
        .expect("claim")
        .expect("claimed");

    let outcome = harness.consumer().handle_message(&message).await.expect("handled");

    assert_eq!(outcome, ProcessOutcome::Deferred);
    assert!(harness.chat.posted().is_empty());
    assert_eq!(harness.llm.calls(), 0);
    assert_eq!(harness.queue.approximate_len(&harness.urls.primary).await, 1);
    let listed = responses_for(&harness, "100.1").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, held.id);
    assert_eq!(listed[0].status, ResponseStatus::Pending);
}

#[tokio::test]
async fn stale_claim_is_taken_over() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&GENERAL_NO_TASK)).await;
    harness.send_envelope(&envelope("<@UBOT> fix this", "100.1", None)).await;
    let message = harness.receive_one().await;

    let mention = MentionRepo::new(Arc::clone(&harness.db))
        .record(&envelope("<@UBOT> fix this", "100.1", None))
        .await
        .expect("record");
    ResponseRepo::new(Arc::clone(&harness.db))
        .claim(&mention.id, chrono::Utc::now())
        .await
        .expect("claim")
        .expect("claimed");

    let consumer = harness.consumer_with(
        Arc::clone(&harness.chat),
        ReceiveOptions {
            visibility_timeout: Duration::ZERO,
            ..receive_options()
        },
    );
    let outcome = consumer.handle_message(&message).await.expect("handled");

    assert_eq!(outcome, ProcessOutcome::Completed);
    assert_eq!(harness.chat.posted().len(), 1);
    let listed = responses_for(&harness, "100.1").await;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].status, ResponseStatus::Failed);
    assert_eq!(listed[1].status, ResponseStatus::Sent);
}

#[tokio::test]
async fn undecodable_body_is_dead_lettered() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&[])).await;
    harness.send("not json at all").await;
    harness
        .send(r#"{"text":"","user":"U1","channel":"C1","ts":"1.0"}"#)
        .await;

    let consumer = harness.consumer();
    let batch = harness.receive_all().await;
    assert_eq!(batch.len(), 2);
    for message in &batch {
        let outcome = consumer.handle_message(message).await.expect("handled");
        assert_eq!(outcome, ProcessOutcome::DeadLettered);
    }

    assert_eq!(harness.llm.calls(), 0);
    assert!(harness.chat.posted().is_empty());
    assert_eq!(harness.queue.approximate_len(&harness.urls.primary).await, 0);
    let dead_letter = harness.urls.dead_letter.as_deref().expect("dlq");
    assert_eq!(harness.queue.approximate_len(dead_letter).await, 2);
}

#[tokio::test]
async fn dead_letter_delete_failure_is_reported() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&[])).await;
    harness.send("not json at all").await;
    let message = harness.receive_one().await;

    let consumer = harness.consumer_over(Arc::new(DeleteFailingQueue {
        inner: Arc::clone(&harness.queue),
    }));
    match consumer.handle_message(&message).await {
        Err(AppError::Queue(msg)) => assert!(msg.contains("receipt handle"), "{msg}"),
        other => panic!("expected queue error, got {other:?}"),
    }

    assert_eq!(harness.queue.approximate_len(&harness.urls.primary).await, 1);
    let dead_letter = harness.urls.dead_letter.as_deref().expect("dlq");
    assert_eq!(harness.queue.approximate_len(dead_letter).await, 1);
}

// ─── Follow-up tasks ───────────────────────────────────────

#[tokio::test]
async fn task_is_created_with_permalink_and_announced() {
    let harness = Harness::new(
        FakeChat::with_permalink("https://team.slack.com/archives/C1/p1001"),
        FakeLlm::scripted(&CODE_ISSUE_WITH_TASK),
    )
    .await;
    let tasks = FakeTasks::new();
    harness.send_envelope(&envelope("<@UBOT> login crashes", "100.1", None)).await;

    let message = harness.receive_one().await;
    let outcome = harness
        .consumer()
        .with_tasks(TaskDispatcher::new(Arc::clone(&tasks) as Arc<dyn TaskStore>))
        .handle_message(&message)
        .await
        .expect("handled");

    assert_eq!(outcome, ProcessOutcome::Completed);
    let created = tasks.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].title, "Fix login crash");
    assert_eq!(created[0].steps, vec!["Reproduce", "Patch"]);
    assert_eq!(
        created[0].source_url.as_deref(),
        Some("https://team.slack.com/archives/C1/p1001")
    );

    let posted = harness.chat.posted();
    assert!(posted[0]
        .text
        .ends_with(":memo: Created a follow-up task: Fix login crash"));
    let responses = responses_for(&harness, "100.1").await;
    assert_eq!(responses[0].task_ref.as_deref(), Some("task-1"));
}

#[tokio::test]
async fn task_from_failed_attempt_is_reused_on_retry() {
    let llm = FakeLlm::scripted(&CODE_ISSUE_WITH_TASK);
    llm.push(&CODE_ISSUE_WITH_TASK);
    let harness = Harness::new(FakeChat::new(), llm).await;
    let tasks = FakeTasks::new();
    let dispatcher = TaskDispatcher::new(Arc::clone(&tasks) as Arc<dyn TaskStore>);
    harness.send_envelope(&envelope("<@UBOT> login crashes", "100.1", None)).await;
    let message = harness.receive_one().await;

    let failing = harness
        .consumer_with(FakeChat::failing(), receive_options())
        .with_tasks(dispatcher.clone());
    assert!(failing.handle_message(&message).await.is_err());

    let outcome = harness
        .consumer()
        .with_tasks(dispatcher)
        .handle_message(&message)
        .await
        .expect("retry");

    assert_eq!(outcome, ProcessOutcome::Completed);
    assert_eq!(tasks.created().len(), 1);
    assert!(harness.chat.posted()[0].text.contains("Fix login crash"));

    let responses = responses_for(&harness, "100.1").await;
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].status, ResponseStatus::Failed);
    assert_eq!(responses[1].status, ResponseStatus::Sent);
    assert_eq!(responses[1].task_ref.as_deref(), Some("task-1"));
}

#[tokio::test]
async fn task_store_failure_still_posts_reply() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&CODE_ISSUE_WITH_TASK)).await;
    harness.send_envelope(&envelope("<@UBOT> login crashes", "100.1", None)).await;

    let message = harness.receive_one().await;
    let outcome = harness
        .consumer()
        .with_tasks(TaskDispatcher::new(FakeTasks::failing() as Arc<dyn TaskStore>))
        .handle_message(&message)
        .await
        .expect("handled");

    assert_eq!(outcome, ProcessOutcome::Completed);
    let posted = harness.chat.posted();
    assert_eq!(posted.len(), 1);
    assert!(!posted[0].text.contains(":memo:"));
}

#[tokio::test]
async fn task_without_store_is_skipped() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&CODE_ISSUE_WITH_TASK)).await;
    harness.send_envelope(&envelope("<@UBOT> login crashes", "100.1", None)).await;

    let message = harness.receive_one().await;
    harness.consumer().handle_message(&message).await.expect("handled");

    assert!(!harness.chat.posted()[0].text.contains(":memo:"));
    assert_eq!(harness.llm.calls(), 4);
}

// ─── Background loop ───────────────────────────────────────

#[tokio::test]
async fn spawned_consumer_drains_queue_and_stops_on_cancel() {
    let harness = Harness::new(FakeChat::new(), FakeLlm::scripted(&GENERAL_NO_TASK)).await;
    let consumer = Arc::new(harness.consumer_with(
        Arc::clone(&harness.chat),
        ReceiveOptions {
            max_messages: 10,
            wait: Duration::from_millis(200),
            visibility_timeout: Duration::from_secs(10),
        },
    ));
    let cancel = CancellationToken::new();
    let handle = spawn_consumer(consumer, cancel.clone());

    harness.send_envelope(&envelope("<@UBOT> hello", "100.1", None)).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while harness.chat.posted().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(harness.chat.posted().len(), 1);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("consumer stops")
        .expect("consumer task");
}
