//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or credential failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Slack API or Socket Mode failure.
    Slack(String),
    /// Queue service send, receive, or delete failure.
    Queue(String),
    /// LLM provider call or response failure.
    Llm(String),
    /// Task store (Notion) failure.
    Notion(String),
    /// Inbound event failed validation.
    Validation(String),
    /// Queue message body could not be decoded into an envelope.
    Decode(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Record status transition is not permitted.
    InvalidTransition(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether retrying the same input can never succeed.
    ///
    /// Permanent failures are dead-lettered immediately by the consumer
    /// instead of waiting for the queue's redrive threshold.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Validation(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Slack(msg) => write!(f, "slack: {msg}"),
            Self::Queue(msg) => write!(f, "queue: {msg}"),
            Self::Llm(msg) => write!(f, "llm: {msg}"),
            Self::Notion(msg) => write!(f, "notion: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::InvalidTransition(msg) => write!(f, "invalid transition: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
