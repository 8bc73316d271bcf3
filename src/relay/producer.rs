//! Mention producer.
//!
//! Turns a mention event into a [`MentionEnvelope`], enqueues it, and
//! tells the user in-thread when enqueueing fails. Enqueue failures are
//! not retried here.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::models::envelope::{MentionEnvelope, MentionEvent, MentionSource};
use crate::queue::QueueClient;
use crate::slack::{ChatPoster, OutgoingMessage};
use crate::Result;

/// Placeholder replaced with `<@USER>` in acknowledgement templates.
pub const USER_PLACEHOLDER: &str = "{user}";

/// Builds and enqueues envelopes for incoming mentions.
pub struct MentionProducer {
    queue: Arc<dyn QueueClient>,
    chat: Arc<dyn ChatPoster>,
    queue_url: String,
    delay: Duration,
    acknowledgement: Option<String>,
}

/// Apology posted when a mention could not be queued.
#[must_use]
pub fn enqueue_failure_notice(user_id: &str) -> String {
    format!(
        "<@{user_id}> Sorry, something went wrong while queueing your message. \
         Please try again in a moment."
    )
}

impl MentionProducer {
    /// Create a producer sending to `queue_url` with a per-message `delay`.
    #[must_use]
    pub fn new(
        queue: Arc<dyn QueueClient>,
        chat: Arc<dyn ChatPoster>,
        queue_url: impl Into<String>,
        delay: Duration,
    ) -> Self {
        Self {
            queue,
            chat,
            queue_url: queue_url.into(),
            delay,
            acknowledgement: None,
        }
    }

    /// Post `template` after every successful enqueue. `{user}` expands to
    /// a mention of the requester.
    #[must_use]
    pub fn with_acknowledgement(mut self, template: impl Into<String>) -> Self {
        self.acknowledgement = Some(template.into());
        self
    }

    /// Queue URL this producer sends to.
    #[must_use]
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Validate, serialize and enqueue a mention.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when user, channel, text or timestamp
    /// is missing (nothing is enqueued or posted). Returns `AppError::Queue`
    /// when the send fails, after one apology has been posted to the
    /// originating thread.
    pub async fn handle_mention_event(&self, event: &MentionEvent) -> Result<MentionEnvelope> {
        self.handle_event_from(event, MentionSource::Slack).await
    }

    /// Same as [`Self::handle_mention_event`] for a mention that arrived
    /// through `source`.
    ///
    /// # Errors
    ///
    /// See [`Self::handle_mention_event`].
    pub async fn handle_event_from(
        &self,
        event: &MentionEvent,
        source: MentionSource,
    ) -> Result<MentionEnvelope> {
        let envelope = MentionEnvelope::from_event_with_source(event, source)?;
        let body = envelope.to_json()?;

        match self.queue.send(&self.queue_url, &body, self.delay).await {
            Ok(message_id) => {
                info!(
                    message_id,
                    channel = envelope.channel_id(),
                    ts = envelope.timestamp(),
                    "mention enqueued"
                );
                self.acknowledge(&envelope).await;
                Ok(envelope)
            }
            Err(err) => {
                warn!(%err, channel = envelope.channel_id(), "failed to enqueue mention");
                let notice = OutgoingMessage::new(
                    envelope.channel_id(),
                    enqueue_failure_notice(envelope.user_id()),
                    envelope.thread_timestamp(),
                );
                if let Err(post_err) = self.chat.post_message(notice).await {
                    warn!(%post_err, "failed to post enqueue failure notice");
                }
                Err(err)
            }
        }
    }

    async fn acknowledge(&self, envelope: &MentionEnvelope) {
        let Some(template) = self.acknowledgement.as_deref() else {
            return;
        };
        let text = template.replace(USER_PLACEHOLDER, &format!("<@{}>", envelope.user_id()));
        let message =
            OutgoingMessage::new(envelope.channel_id(), text, envelope.thread_timestamp());
        if let Err(err) = self.chat.post_message(message).await {
            warn!(%err, "acknowledgement not posted");
        }
    }
}
