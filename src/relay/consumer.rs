//! Mention consumer.
//!
//! Drains the queue and drives each message through
//! `Received → Processing → {Completed (delete), Failed (left for redelivery)}`.
//!
//! Delivery is at-least-once, so each attempt first records the mention
//! and checks for an existing `sent` response; a redelivered message whose
//! reply already went out is acknowledged without posting again. Before
//! any outward call the attempt claims the mention with a `pending`
//! response. Only one claim can be live per mention, so a copy that loses
//! the race is deferred and left for redelivery. Bodies that can never
//! decode are moved to the dead-letter queue at once when its URL is
//! known.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::dispatch::{ReplyDispatcher, TaskDispatcher};
use crate::models::envelope::MentionEnvelope;
use crate::models::intent::TaskDescriptor;
use crate::models::mention::Mention;
use crate::models::response::MentionResponse;
use crate::persistence::db::Database;
use crate::persistence::mention_repo::MentionRepo;
use crate::persistence::response_repo::ResponseRepo;
use crate::pipeline::IntentPipeline;
use crate::queue::{QueueClient, QueueUrls, ReceiveOptions, ReceivedMessage};
use crate::Result;

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Terminal state of a successfully handled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Reply posted and message deleted.
    Completed,
    /// A reply was already sent for this mention; message deleted.
    Duplicate,
    /// Body was permanently undecodable; moved to the dead-letter queue.
    DeadLettered,
    /// Another attempt holds this mention; message left for redelivery.
    Deferred,
}

/// Queue-draining worker.
pub struct MentionConsumer {
    queue: Arc<dyn QueueClient>,
    urls: QueueUrls,
    options: ReceiveOptions,
    mentions: MentionRepo,
    responses: ResponseRepo,
    pipeline: Arc<IntentPipeline>,
    replies: ReplyDispatcher,
    tasks: Option<TaskDispatcher>,
    reply_in_thread: bool,
}

/// Line appended to a reply when a follow-up task exists.
#[must_use]
pub fn task_line(title: &str) -> String {
    format!("\n:memo: Created a follow-up task: {title}")
}

impl MentionConsumer {
    /// Create a consumer without task creation and with top-level replies
    /// for unthreaded mentions.
    #[must_use]
    pub fn new(
        queue: Arc<dyn QueueClient>,
        urls: QueueUrls,
        options: ReceiveOptions,
        db: Arc<Database>,
        pipeline: Arc<IntentPipeline>,
        replies: ReplyDispatcher,
    ) -> Self {
        Self {
            queue,
            urls,
            options,
            mentions: MentionRepo::new(Arc::clone(&db)),
            responses: ResponseRepo::new(db),
            pipeline,
            replies,
            tasks: None,
            reply_in_thread: false,
        }
    }

    /// Create follow-up tasks through `tasks`.
    #[must_use]
    pub fn with_tasks(mut self, tasks: TaskDispatcher) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Thread replies under unthreaded mentions instead of posting them
    /// at the top level.
    #[must_use]
    pub fn with_reply_in_thread(mut self, reply_in_thread: bool) -> Self {
        self.reply_in_thread = reply_in_thread;
        self
    }

    /// Receive one batch and process it concurrently.
    ///
    /// Returns the number of messages received.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if the receive call fails. Per-message
    /// failures are logged and leave the message for redelivery.
    pub async fn poll_once(&self) -> Result<usize> {
        let batch = self.receive_batch().await?;
        self.process_batch(&batch).await;
        Ok(batch.len())
    }

    async fn receive_batch(&self) -> Result<Vec<ReceivedMessage>> {
        let batch = self.queue.receive(&self.urls.primary, self.options).await?;
        if !batch.is_empty() {
            debug!(received = batch.len(), "received mention batch");
        }
        Ok(batch)
    }

    /// Process a received batch concurrently, logging each outcome.
    pub async fn process_batch(&self, batch: &[ReceivedMessage]) {
        join_all(batch.iter().map(|message| {
            let span = info_span!(
                "process_message",
                message_id = %message.message_id,
                receive_count = message.receive_count
            );
            async move {
                match self.handle_message(message).await {
                    Ok(outcome) => info!(?outcome, "message handled"),
                    Err(err) => warn!(%err, "message left for redelivery"),
                }
            }
            .instrument(span)
        }))
        .await;
    }

    /// Process one received message.
    ///
    /// The message is deleted for every `Ok` outcome except
    /// [`ProcessOutcome::Deferred`].
    ///
    /// # Errors
    ///
    /// Any error means the message was left on the queue and will be
    /// redelivered after its visibility timeout.
    pub async fn handle_message(&self, message: &ReceivedMessage) -> Result<ProcessOutcome> {
        let envelope = match MentionEnvelope::from_json(&message.body) {
            Ok(envelope) => envelope,
            Err(err) if err.is_permanent() => return self.dead_letter(message, err).await,
            Err(err) => return Err(err),
        };

        let mention = self.mentions.record(&envelope).await?;
        if let Some(sent) = self.responses.find_sent_for_mention(&mention.id).await? {
            info!(mention_id = %mention.id, response_id = %sent.id, "reply already sent; skipping");
            self.ack(message).await;
            return Ok(ProcessOutcome::Duplicate);
        }

        let Some(response) = self
            .responses
            .claim(&mention.id, self.stale_claim_cutoff())
            .await?
        else {
            return self.defer(message, &mention).await;
        };

        let outcome = match self.pipeline.process(&envelope).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.release(&response).await;
                return Err(err);
            }
        };
        if let Err(err) = self.responses.set_content(&response.id, &outcome.reply).await {
            self.release(&response).await;
            return Err(err);
        }

        let mut text = outcome.reply;
        if let Some(task) = outcome.task.as_ref() {
            if self.ensure_task(&mention, &response, task).await {
                text.push_str(&task_line(&task.title));
            }
        }

        let thread_ts = self.reply_anchor(&envelope);
        if let Err(err) = self
            .replies
            .post_reply(envelope.channel_id(), thread_ts, envelope.user_id(), &text)
            .await
        {
            self.release(&response).await;
            return Err(err);
        }

        self.responses.mark_sent(&response.id).await?;
        self.ack(message).await;
        Ok(ProcessOutcome::Completed)
    }

    /// Claims older than one visibility timeout belong to attempts whose
    /// message has already become visible again.
    fn stale_claim_cutoff(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.options.visibility_timeout)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    async fn defer(&self, message: &ReceivedMessage, mention: &Mention) -> Result<ProcessOutcome> {
        if let Some(sent) = self.responses.find_sent_for_mention(&mention.id).await? {
            info!(mention_id = %mention.id, response_id = %sent.id, "reply already sent; skipping");
            self.ack(message).await;
            return Ok(ProcessOutcome::Duplicate);
        }
        info!(mention_id = %mention.id, "mention held by another attempt; deferring");
        Ok(ProcessOutcome::Deferred)
    }

    async fn release(&self, response: &MentionResponse) {
        if let Err(err) = self.responses.mark_failed(&response.id).await {
            error!(%err, response_id = %response.id, "failed to release processing claim");
        }
    }

    fn reply_anchor<'e>(&self, envelope: &'e MentionEnvelope) -> Option<&'e str> {
        envelope
            .thread_timestamp()
            .or_else(|| self.reply_in_thread.then_some(envelope.timestamp()))
    }

    /// Make sure a task exists for this mention. Reuses a task created by
    /// an earlier attempt. Returns whether a task is now linked.
    async fn ensure_task(
        &self,
        mention: &Mention,
        response: &MentionResponse,
        task: &TaskDescriptor,
    ) -> bool {
        let Some(tasks) = self.tasks.as_ref() else {
            debug!(mention_id = %mention.id, "task requested but no task store configured");
            return false;
        };

        let existing = match self.responses.latest_task_ref(&mention.id).await {
            Ok(existing) => existing,
            Err(err) => {
                warn!(%err, mention_id = %mention.id, "could not look up earlier task");
                return false;
            }
        };

        let task_ref = if let Some(task_ref) = existing {
            debug!(task_ref, "reusing task from earlier attempt");
            task_ref
        } else {
            let source = self
                .replies
                .permalink(&mention.channel_id, &mention.timestamp)
                .await;
            match tasks.create_from_descriptor(task, source.as_deref()).await {
                Ok(id) => id.0,
                Err(_) => return false,
            }
        };

        if let Err(err) = self.responses.set_task_ref(&response.id, &task_ref).await {
            warn!(%err, task_ref, "task created but not linked to response");
        }
        true
    }

    async fn dead_letter(
        &self,
        message: &ReceivedMessage,
        err: crate::AppError,
    ) -> Result<ProcessOutcome> {
        let Some(dead_letter_url) = self.urls.dead_letter.as_deref() else {
            warn!(%err, "undecodable message; waiting for queue redrive");
            return Err(err);
        };
        warn!(%err, "undecodable message; moving to dead-letter queue");
        self.queue
            .send(dead_letter_url, &message.body, Duration::ZERO)
            .await?;
        self.queue
            .delete(&self.urls.primary, &message.receipt_handle)
            .await?;
        Ok(ProcessOutcome::DeadLettered)
    }

    async fn ack(&self, message: &ReceivedMessage) {
        if let Err(err) = self
            .queue
            .delete(&self.urls.primary, &message.receipt_handle)
            .await
        {
            warn!(%err, "delete failed; message may be redelivered");
        }
    }
}

/// Spawn the consumer loop. Exits when `cancel` fires; an in-flight batch
/// is finished first.
#[must_use]
pub fn spawn_consumer(consumer: Arc<MentionConsumer>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(queue_url = %consumer.urls.primary, "mention consumer started");
        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = consumer.receive_batch() => received,
            };
            match received {
                Ok(batch) => consumer.process_batch(&batch).await,
                Err(err) => {
                    error!(%err, "queue receive failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }
        info!("mention consumer shutting down");
    })
}
