//! Mention envelope: the unit of work crossing the queue boundary.
//!
//! The wire format is the flat JSON object the listener has always
//! produced: `text`, `user`, `channel`, `ts`, `thread_ts`, `source`.
//! Both construction and decoding go through the same validation, so a
//! held `MentionEnvelope` always has non-empty user, channel and text.

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Producer that created an envelope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MentionSource {
    /// Slack `app_mention` event.
    #[default]
    Slack,
    /// Any other intake path.
    Other,
}

/// Raw inbound mention as received from Slack or the HTTP intake surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MentionEvent {
    /// Channel the mention was posted in.
    #[serde(default)]
    pub channel: String,
    /// Mentioning user.
    #[serde(default)]
    pub user: String,
    /// Message text, including the bot mention token.
    #[serde(default)]
    pub text: String,
    /// Slack event timestamp (`ts`).
    #[serde(default)]
    pub ts: String,
    /// Parent thread timestamp; empty or absent for top-level messages.
    #[serde(default)]
    pub thread_ts: Option<String>,
}

/// Serialized form of [`MentionEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnvelopeWire {
    text: String,
    user: String,
    channel: String,
    ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thread_ts: Option<String>,
    #[serde(default)]
    source: MentionSource,
}

/// Validated, immutable description of one Slack mention.
///
/// Identity for deduplication is `(channel_id, timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "EnvelopeWire", into = "EnvelopeWire")]
pub struct MentionEnvelope {
    text: String,
    user_id: String,
    channel_id: String,
    timestamp: String,
    thread_timestamp: Option<String>,
    source: MentionSource,
}

impl MentionEnvelope {
    /// Build an envelope, rejecting empty user, channel, text or timestamp.
    ///
    /// An empty `thread_timestamp` is normalised to `None`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` naming the first missing field.
    pub fn new(
        text: impl Into<String>,
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        timestamp: impl Into<String>,
        thread_timestamp: Option<String>,
        source: MentionSource,
    ) -> Result<Self> {
        let envelope = Self {
            text: text.into(),
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            timestamp: timestamp.into(),
            thread_timestamp: thread_timestamp.filter(|ts| !ts.trim().is_empty()),
            source,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Build an envelope from a raw Slack mention event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when required fields are missing.
    pub fn from_event(event: &MentionEvent) -> Result<Self> {
        Self::from_event_with_source(event, MentionSource::Slack)
    }

    /// Build an envelope from a mention event delivered by `source`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when required fields are missing.
    pub fn from_event_with_source(event: &MentionEvent, source: MentionSource) -> Result<Self> {
        Self::new(
            event.text.clone(),
            event.user.clone(),
            event.channel.clone(),
            event.ts.clone(),
            event.thread_ts.clone(),
            source,
        )
    }

    /// Decode a queue message body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Decode` for malformed JSON or a body that fails
    /// envelope validation. Both are permanent.
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|err| AppError::Decode(format!("bad envelope: {err}")))
    }

    /// Encode as a queue message body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Decode` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Message text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Mentioning user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Channel id.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Slack event timestamp.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Parent thread timestamp; `None` for a top-level message.
    #[must_use]
    pub fn thread_timestamp(&self) -> Option<&str> {
        self.thread_timestamp.as_deref()
    }

    /// Producer tag.
    #[must_use]
    pub fn source(&self) -> MentionSource {
        self.source
    }

    /// Text with Slack user-mention tokens (`<@U123>`) removed.
    #[must_use]
    pub fn prompt_text(&self) -> String {
        strip_mentions(&self.text)
    }

    fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(AppError::Validation("user id is required".into()));
        }
        if self.channel_id.trim().is_empty() {
            return Err(AppError::Validation("channel id is required".into()));
        }
        if self.text.trim().is_empty() {
            return Err(AppError::Validation("text is required".into()));
        }
        if self.timestamp.trim().is_empty() {
            return Err(AppError::Validation("timestamp is required".into()));
        }
        Ok(())
    }
}

impl TryFrom<EnvelopeWire> for MentionEnvelope {
    type Error = AppError;

    fn try_from(wire: EnvelopeWire) -> Result<Self> {
        Self::new(
            wire.text,
            wire.user,
            wire.channel,
            wire.ts,
            wire.thread_ts,
            wire.source,
        )
    }
}

impl From<MentionEnvelope> for EnvelopeWire {
    fn from(envelope: MentionEnvelope) -> Self {
        Self {
            text: envelope.text,
            user: envelope.user_id,
            channel: envelope.channel_id,
            ts: envelope.timestamp,
            thread_ts: envelope.thread_timestamp,
            source: envelope.source,
        }
    }
}

fn strip_mentions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    out.push_str(rest);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
