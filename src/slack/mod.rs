//! Slack bridge: outbound chat posting and inbound Socket Mode events.

pub mod client;
pub mod events;

use std::future::Future;
use std::pin::Pin;

use crate::Result;

/// A chat message to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Target channel identifier.
    pub channel: String,
    /// Plain-text body (mrkdwn).
    pub text: String,
    /// Parent message timestamp; `None` posts at the top level.
    pub thread_ts: Option<String>,
}

impl OutgoingMessage {
    /// Build a message for `channel`, optionally threaded.
    pub fn new(
        channel: impl Into<String>,
        text: impl Into<String>,
        thread_ts: Option<impl Into<String>>,
    ) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            thread_ts: thread_ts.map(Into::into),
        }
    }
}

/// Outbound chat operations.
pub trait ChatPoster: Send + Sync {
    /// Post a message and return its timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Slack`](crate::AppError::Slack) if the API call fails.
    fn post_message(
        &self,
        message: OutgoingMessage,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Resolve a permalink for a posted message.
    ///
    /// Returns `Ok(None)` when the workspace does not expose one.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Slack`](crate::AppError::Slack) if the API call fails.
    fn permalink(
        &self,
        channel: &str,
        ts: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>>;
}
