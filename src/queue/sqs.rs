//! SQS-backed queue client.
//!
//! Works against AWS or any SQS-compatible endpoint (`ElasticMQ`,
//! `LocalStack`). Credentials come from configuration rather than the
//! ambient AWS provider chain so that the keychain lookup stays the single
//! source of secrets.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use aws_sdk_sqs::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use tracing::info;

use super::{QueueClient, QueueUrls, ReceiveOptions, ReceivedMessage};
use crate::config::QueueConfig;
use crate::{AppError, Result};

/// Queue client over the AWS SDK.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
}

fn seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

fn queue_err(action: &str, err: &impl std::error::Error) -> AppError {
    AppError::Queue(format!("{action} failed: {}", DisplayErrorContext(err)))
}

impl SqsQueue {
    /// Build a client from queue configuration.
    ///
    /// An empty `endpoint` uses the regional AWS endpoint.
    #[must_use]
    pub fn from_config(config: &QueueConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "mention-relay",
        );
        let mut builder = aws_sdk_sqs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(config.endpoint.clone());
        }
        Self {
            client: aws_sdk_sqs::Client::from_conf(builder.build()),
        }
    }

    /// Create the dead-letter and primary queues, wiring the redrive policy.
    ///
    /// Creation is idempotent on the service side when attributes match.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if any create or attribute call fails.
    pub async fn provision(&self, config: &QueueConfig) -> Result<QueueUrls> {
        let mut dead_letter = None;
        let mut redrive_policy = None;

        if let Some(name) = config.dead_letter_queue_name.as_deref().filter(|n| !n.is_empty()) {
            let url = self.create_queue(name, Vec::new()).await?;
            let attributes = self
                .client
                .get_queue_attributes()
                .queue_url(&url)
                .attribute_names(QueueAttributeName::QueueArn)
                .send()
                .await
                .map_err(|e| queue_err("get_queue_attributes", &e))?;
            let arn = attributes
                .attributes()
                .and_then(|attrs| attrs.get(&QueueAttributeName::QueueArn))
                .cloned()
                .ok_or_else(|| AppError::Queue(format!("no QueueArn returned for {url}")))?;
            redrive_policy = Some(
                serde_json::json!({
                    "deadLetterTargetArn": arn,
                    "maxReceiveCount": config.max_receive_count.to_string(),
                })
                .to_string(),
            );
            dead_letter = Some(url);
        }

        let mut attributes = vec![
            (
                QueueAttributeName::VisibilityTimeout,
                config.visibility_timeout_seconds.to_string(),
            ),
            (QueueAttributeName::DelaySeconds, config.delay_seconds.to_string()),
        ];
        if let Some(policy) = redrive_policy {
            attributes.push((QueueAttributeName::RedrivePolicy, policy));
        }
        let primary = self.create_queue(&config.queue_name, attributes).await?;

        info!(primary, ?dead_letter, "queues provisioned");
        Ok(QueueUrls {
            primary,
            dead_letter,
        })
    }

    async fn create_queue(
        &self,
        name: &str,
        attributes: Vec<(QueueAttributeName, String)>,
    ) -> Result<String> {
        let mut request = self.client.create_queue().queue_name(name);
        for (key, value) in attributes {
            request = request.attributes(key, value);
        }
        let output = request
            .send()
            .await
            .map_err(|e| queue_err("create_queue", &e))?;
        output
            .queue_url()
            .map(str::to_owned)
            .ok_or_else(|| AppError::Queue(format!("no queue url returned for {name}")))
    }
}

impl QueueClient for SqsQueue {
    fn send(
        &self,
        queue_url: &str,
        body: &str,
        delay: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let request = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .delay_seconds(seconds(delay));
        Box::pin(async move {
            let output = request
                .send()
                .await
                .map_err(|e| queue_err("send_message", &e))?;
            Ok(output.message_id().unwrap_or_default().to_owned())
        })
    }

    fn receive(
        &self,
        queue_url: &str,
        options: ReceiveOptions,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ReceivedMessage>>> + Send + '_>> {
        let max_messages = i32::try_from(options.max_messages.clamp(1, 10)).unwrap_or(10);
        let request = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(seconds(options.wait))
            .visibility_timeout(seconds(options.visibility_timeout))
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount);
        Box::pin(async move {
            let output = request
                .send()
                .await
                .map_err(|e| queue_err("receive_message", &e))?;
            let messages = output
                .messages()
                .iter()
                .filter_map(|message| {
                    let receipt_handle = message.receipt_handle()?.to_owned();
                    let receive_count = message
                        .attributes()
                        .and_then(|attrs| {
                            attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount)
                        })
                        .and_then(|raw| raw.parse().ok())
                        .unwrap_or(1);
                    Some(ReceivedMessage {
                        message_id: message.message_id().unwrap_or_default().to_owned(),
                        body: message.body().unwrap_or_default().to_owned(),
                        receipt_handle,
                        receive_count,
                    })
                })
                .collect();
            Ok(messages)
        })
    }

    fn delete(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let request = self
            .client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle);
        Box::pin(async move {
            request
                .send()
                .await
                .map_err(|e| queue_err("delete_message", &e))?;
            Ok(())
        })
    }
}
