//! Reply dispatcher.

use std::sync::Arc;

use tracing::{info, warn};

use crate::slack::{ChatPoster, OutgoingMessage};
use crate::Result;

/// Prefix `text` with a mention of `user_id` unless it already has one.
#[must_use]
pub fn with_mention(user_id: &str, text: &str) -> String {
    let tag = format!("<@{user_id}>");
    if user_id.is_empty() || text.contains(&tag) {
        text.to_owned()
    } else {
        format!("{tag} {text}")
    }
}

/// Posts pipeline replies to Slack.
#[derive(Clone)]
pub struct ReplyDispatcher {
    chat: Arc<dyn ChatPoster>,
}

impl ReplyDispatcher {
    /// Create a dispatcher over `chat`.
    #[must_use]
    pub fn new(chat: Arc<dyn ChatPoster>) -> Self {
        Self { chat }
    }

    /// Post `text` to `channel_id`, threaded under `thread_ts` when given,
    /// always mentioning the requester. Returns the posted message's ts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the post fails.
    pub async fn post_reply(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        mention_user_id: &str,
        text: &str,
    ) -> Result<String> {
        let message =
            OutgoingMessage::new(channel_id, with_mention(mention_user_id, text), thread_ts);
        match self.chat.post_message(message).await {
            Ok(ts) => {
                info!(channel_id, ts, threaded = thread_ts.is_some(), "reply posted");
                Ok(ts)
            }
            Err(err) => {
                warn!(%err, channel_id, "reply not posted");
                Err(err)
            }
        }
    }

    /// Permalink of a message, `None` when unavailable for any reason.
    pub async fn permalink(&self, channel_id: &str, ts: &str) -> Option<String> {
        match self.chat.permalink(channel_id, ts).await {
            Ok(link) => link,
            Err(err) => {
                warn!(%err, channel_id, ts, "permalink lookup failed");
                None
            }
        }
    }
}
