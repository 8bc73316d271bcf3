//! In-process queue with SQS delivery semantics.
//!
//! Supports per-message delay, visibility timeout, receive counting and
//! a redrive policy that moves a message to its dead-letter queue once it
//! has been received `max_receive_count` times without being deleted.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{QueueClient, QueueUrls, ReceiveOptions, ReceivedMessage};
use crate::config::QueueConfig;
use crate::{AppError, Result};

const URL_PREFIX: &str = "memory://queue/";

/// Redrive settings for a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedrivePolicy {
    /// URL of the dead-letter queue.
    pub dead_letter_url: String,
    /// Receives allowed before the message is moved.
    pub max_receive_count: u32,
}

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: String,
    receive_count: u32,
    visible_at: Instant,
    receipt_handle: Option<String>,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<StoredMessage>,
    redrive: Option<RedrivePolicy>,
}

/// Process-local queue service.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    notify: Notify,
}

impl MemoryQueue {
    /// Create an empty queue service with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reconfigure) a queue and return its URL.
    pub async fn create_queue(&self, name: &str, redrive: Option<RedrivePolicy>) -> String {
        let url = format!("{URL_PREFIX}{name}");
        let mut queues = self.queues.lock().await;
        queues.entry(url.clone()).or_default().redrive = redrive;
        url
    }

    /// Create the primary and dead-letter queues described by `config`.
    pub async fn provision(&self, config: &QueueConfig) -> QueueUrls {
        let dead_letter = match config.dead_letter_queue_name.as_deref() {
            Some(name) if !name.is_empty() => Some(self.create_queue(name, None).await),
            _ => None,
        };
        let redrive = dead_letter.as_ref().map(|url| RedrivePolicy {
            dead_letter_url: url.clone(),
            max_receive_count: config.max_receive_count,
        });
        let primary = self.create_queue(&config.queue_name, redrive).await;
        QueueUrls {
            primary,
            dead_letter,
        }
    }

    /// Number of messages held by a queue, visible or not.
    pub async fn approximate_len(&self, queue_url: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue_url)
            .map_or(0, |q| q.messages.len())
    }

    async fn send_inner(&self, queue_url: &str, body: String, delay: Duration) -> Result<String> {
        let message_id = uuid::Uuid::new_v4().to_string();
        {
            let mut queues = self.queues.lock().await;
            let queue = queues
                .get_mut(queue_url)
                .ok_or_else(|| AppError::Queue(format!("queue does not exist: {queue_url}")))?;
            queue.messages.push_back(StoredMessage {
                message_id: message_id.clone(),
                body,
                receive_count: 0,
                visible_at: Instant::now() + delay,
                receipt_handle: None,
            });
        }
        self.notify.notify_waiters();
        Ok(message_id)
    }

    /// Take visible messages, applying redrive. Returns the batch and the
    /// earliest instant at which a hidden message becomes visible.
    fn take_visible(
        queues: &mut HashMap<String, QueueState>,
        queue_url: &str,
        options: ReceiveOptions,
        now: Instant,
    ) -> Result<(Vec<ReceivedMessage>, Option<Instant>)> {
        let queue = queues
            .get_mut(queue_url)
            .ok_or_else(|| AppError::Queue(format!("queue does not exist: {queue_url}")))?;
        let redrive = queue.redrive.clone();
        let limit = usize::try_from(options.max_messages.clamp(1, 10)).unwrap_or(10);

        let mut batch = Vec::new();
        let mut moved = Vec::new();
        let mut next_visible: Option<Instant> = None;
        let mut index = 0;
        while index < queue.messages.len() && batch.len() < limit {
            let message = &mut queue.messages[index];
            if message.visible_at > now {
                let at = message.visible_at;
                next_visible = Some(next_visible.map_or(at, |t| t.min(at)));
                index += 1;
                continue;
            }
            if let Some(policy) = redrive.as_ref() {
                if message.receive_count >= policy.max_receive_count {
                    if let Some(stored) = queue.messages.remove(index) {
                        moved.push((policy.dead_letter_url.clone(), stored));
                    }
                    continue;
                }
            }
            let handle = uuid::Uuid::new_v4().to_string();
            message.receive_count += 1;
            message.visible_at = now + options.visibility_timeout;
            message.receipt_handle = Some(handle.clone());
            batch.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                body: message.body.clone(),
                receipt_handle: handle,
                receive_count: message.receive_count,
            });
            index += 1;
        }

        for (dead_letter_url, mut stored) in moved {
            match queues.get_mut(&dead_letter_url) {
                Some(dlq) => {
                    debug!(message_id = %stored.message_id, "moving message to dead-letter queue");
                    stored.receive_count = 0;
                    stored.visible_at = now;
                    stored.receipt_handle = None;
                    dlq.messages.push_back(stored);
                }
                None => warn!(
                    message_id = %stored.message_id,
                    dead_letter_url,
                    "dead-letter queue missing; message dropped"
                ),
            }
        }

        Ok((batch, next_visible))
    }

    async fn receive_inner(
        &self,
        queue_url: &str,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>> {
        let deadline = Instant::now() + options.wait;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Instant::now();
            let (batch, next_visible) = {
                let mut queues = self.queues.lock().await;
                Self::take_visible(&mut queues, queue_url, options, now)?
            };
            if !batch.is_empty() || now >= deadline {
                return Ok(batch);
            }

            let wake = next_visible.map_or(deadline, |t| t.min(deadline));
            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    async fn delete_inner(&self, queue_url: &str, receipt_handle: &str) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let queue = queues
            .get_mut(queue_url)
            .ok_or_else(|| AppError::Queue(format!("queue does not exist: {queue_url}")))?;
        let position = queue
            .messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(|| {
                AppError::Queue(format!("receipt handle is not current: {receipt_handle}"))
            })?;
        queue.messages.remove(position);
        Ok(())
    }
}

impl QueueClient for MemoryQueue {
    fn send(
        &self,
        queue_url: &str,
        body: &str,
        delay: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let queue_url = queue_url.to_owned();
        let body = body.to_owned();
        Box::pin(async move { self.send_inner(&queue_url, body, delay).await })
    }

    fn receive(
        &self,
        queue_url: &str,
        options: ReceiveOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ReceivedMessage>>> + Send + '_>> {
        let queue_url = queue_url.to_owned();
        Box::pin(async move { self.receive_inner(&queue_url, options).await })
    }

    fn delete(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let queue_url = queue_url.to_owned();
        let receipt_handle = receipt_handle.to_owned();
        Box::pin(async move { self.delete_inner(&queue_url, &receipt_handle).await })
    }
}
