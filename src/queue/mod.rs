//! Message queue abstraction.
//!
//! The [`QueueClient`] trait decouples the producer and consumer from the
//! concrete queue service. [`sqs::SqsQueue`] talks to SQS or an
//! SQS-compatible endpoint such as `ElasticMQ`; [`memory::MemoryQueue`]
//! keeps everything in-process for single-process deployments and tests.

pub mod memory;
pub mod sqs;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{QueueBackend, QueueConfig};
use crate::Result;

/// Receive parameters for a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Upper bound on messages returned (1..=10).
    pub max_messages: u32,
    /// Long-poll wait when the queue is empty.
    pub wait: Duration,
    /// How long received messages stay hidden from other consumers.
    pub visibility_timeout: Duration,
}

impl ReceiveOptions {
    /// Build receive options from queue configuration.
    #[must_use]
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_messages: config.max_messages,
            wait: config.wait(),
            visibility_timeout: config.visibility_timeout(),
        }
    }
}

/// A message handed out by [`QueueClient::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Queue-assigned message identifier, stable across redeliveries.
    pub message_id: String,
    /// Raw body as sent.
    pub body: String,
    /// Handle for this particular delivery; required to delete.
    pub receipt_handle: String,
    /// How many times the message has been received, including this one.
    pub receive_count: u32,
}

/// Minimal queue surface used by the relay.
///
/// Delivery is at-least-once: a received message becomes visible again
/// once its visibility timeout lapses unless it is deleted first.
pub trait QueueClient: Send + Sync {
    /// Send `body` to `queue_url`, hidden for `delay` before first delivery.
    ///
    /// Returns the queue-assigned message identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Queue`](crate::AppError::Queue) if the service rejects the send.
    fn send(
        &self,
        queue_url: &str,
        body: &str,
        delay: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Receive up to `options.max_messages` messages, long-polling.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Queue`](crate::AppError::Queue) if the poll fails.
    fn receive(
        &self,
        queue_url: &str,
        options: ReceiveOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ReceivedMessage>>> + Send + '_>>;

    /// Delete a delivered message by its receipt handle.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Queue`](crate::AppError::Queue) if the handle is
    /// stale or the service rejects the call.
    fn delete(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Queue URLs resolved for the running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueUrls {
    /// Primary mention queue.
    pub primary: String,
    /// Dead-letter queue, when one is configured.
    pub dead_letter: Option<String>,
}

/// Build the configured queue backend.
///
/// For the memory backend both queues are created in-process and the
/// returned URLs point at them. For SQS the URLs come from configuration;
/// `provision` additionally creates the queues and redrive policy first.
///
/// # Errors
///
/// Returns [`AppError::Queue`](crate::AppError::Queue) if provisioning fails.
pub async fn build_queue(
    config: &QueueConfig,
    provision: bool,
) -> Result<(Arc<dyn QueueClient>, QueueUrls)> {
    match config.backend {
        QueueBackend::Memory => {
            let queue = memory::MemoryQueue::new();
            let urls = queue.provision(config).await;
            Ok((Arc::new(queue), urls))
        }
        QueueBackend::Sqs => {
            let queue = sqs::SqsQueue::from_config(config);
            let urls = if provision {
                queue.provision(config).await?
            } else {
                QueueUrls {
                    primary: config.queue_url(),
                    dead_letter: config.dead_letter_queue_url(),
                }
            };
            Ok((Arc::new(queue), urls))
        }
    }
}
