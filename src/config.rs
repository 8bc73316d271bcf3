//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::role::Role;
use crate::{AppError, Result};

const KEYRING_SERVICE: &str = "mention-relay";

/// Slack behaviour settings.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// never from the TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// Post an immediate acknowledgement after a successful enqueue.
    #[serde(default)]
    pub acknowledge: bool,
    /// Acknowledgement text; `{user}` is replaced with the user mention.
    #[serde(default = "default_acknowledgement_text")]
    pub acknowledgement_text: String,
    /// Anchor replies to top-level mentions in a new thread under the mention.
    #[serde(default)]
    pub reply_in_thread: bool,
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            acknowledge: false,
            acknowledgement_text: default_acknowledgement_text(),
            reply_in_thread: false,
            app_token: String::new(),
            bot_token: String::new(),
        }
    }
}

fn default_acknowledgement_text() -> String {
    "{user} Got it, working on your request.".into()
}

/// Queue implementation selected at startup.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    /// SQS-compatible HTTP service (AWS SQS, `ElasticMQ`).
    #[default]
    Sqs,
    /// In-process queue; only valid when listener and worker share a process.
    Memory,
}

/// Queue service connectivity and delivery settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QueueConfig {
    /// Queue implementation.
    #[serde(default)]
    pub backend: QueueBackend,
    /// Service endpoint, e.g. `http://localhost:9324`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Primary queue name.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    /// Dead-letter queue name; `None` disables explicit dead-lettering.
    #[serde(default = "default_dead_letter_queue_name")]
    pub dead_letter_queue_name: Option<String>,
    /// Explicit primary queue URL overriding the `{endpoint}/queue/{name}` layout.
    #[serde(default)]
    pub queue_url: Option<String>,
    /// Explicit dead-letter queue URL.
    #[serde(default)]
    pub dead_letter_queue_url: Option<String>,
    /// Signing region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Long-poll wait per receive call (0–20 seconds).
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: u64,
    /// How long a received message stays hidden from other consumers.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_seconds: u64,
    /// Delivery delay applied to newly sent envelopes.
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: u64,
    /// Receives allowed before the queue moves a message to the dead-letter queue.
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,
    /// Maximum messages fetched per receive call (1–10).
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
    /// Access key id (populated at runtime).
    #[serde(skip)]
    pub access_key_id: String,
    /// Secret access key (populated at runtime).
    #[serde(skip)]
    pub secret_access_key: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            endpoint: default_endpoint(),
            queue_name: default_queue_name(),
            dead_letter_queue_name: default_dead_letter_queue_name(),
            queue_url: None,
            dead_letter_queue_url: None,
            region: default_region(),
            wait_seconds: default_wait_seconds(),
            visibility_timeout_seconds: default_visibility_timeout(),
            delay_seconds: default_delay_seconds(),
            max_receive_count: default_max_receive_count(),
            max_messages: default_max_messages(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:9324".into()
}

fn default_queue_name() -> String {
    "slack-mentions".into()
}

#[allow(clippy::unnecessary_wraps)] // serde default must match the field type.
fn default_dead_letter_queue_name() -> Option<String> {
    Some("slack-mentions-dlq".into())
}

fn default_region() -> String {
    "us-east-1".into()
}

fn default_wait_seconds() -> u64 {
    20
}

fn default_visibility_timeout() -> u64 {
    10
}

fn default_delay_seconds() -> u64 {
    5
}

fn default_max_receive_count() -> u32 {
    3
}

fn default_max_messages() -> u32 {
    10
}

impl QueueConfig {
    /// URL of the primary queue.
    #[must_use]
    pub fn queue_url(&self) -> String {
        self.queue_url
            .clone()
            .unwrap_or_else(|| self.url_for(&self.queue_name))
    }

    /// URL of the dead-letter queue, when one is configured.
    #[must_use]
    pub fn dead_letter_queue_url(&self) -> Option<String> {
        self.dead_letter_queue_url.clone().or_else(|| {
            self.dead_letter_queue_name
                .as_deref()
                .map(|name| self.url_for(name))
        })
    }

    /// Long-poll wait as a [`Duration`].
    #[must_use]
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }

    /// Visibility timeout as a [`Duration`].
    #[must_use]
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    /// Delivery delay as a [`Duration`].
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }

    fn url_for(&self, name: &str) -> String {
        format!("{}/queue/{name}", self.endpoint.trim_end_matches('/'))
    }
}

/// LLM provider used by the intent pipeline.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Anthropic Messages API.
    #[default]
    Anthropic,
    /// Google Gemini `generateContent` API.
    Gemini,
}

/// LLM call settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// Provider selection.
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name passed to the provider.
    #[serde(default = "default_model")]
    pub model: String,
    /// Completion token ceiling per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Override of the provider's API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Provider API key (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            base_url: None,
            api_key: String::new(),
        }
    }
}

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".into()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

/// Notion task store settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NotionConfig {
    /// Whether follow-up tasks are created at all.
    #[serde(default)]
    pub enabled: bool,
    /// Target database id.
    #[serde(default)]
    pub database_id: String,
    /// Name of the database's title property.
    #[serde(default = "default_title_property")]
    pub title_property: String,
    /// Optional select property set on new tasks.
    #[serde(default)]
    pub status_property: Option<String>,
    /// Value written to `status_property`.
    #[serde(default)]
    pub status_value: Option<String>,
    /// Override of the Notion API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Integration token (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database_id: String::new(),
            title_property: default_title_property(),
            status_property: None,
            status_value: None,
            base_url: None,
            api_key: String::new(),
        }
    }
}

fn default_title_property() -> String {
    "Name".into()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/mention-relay.db")
}

fn default_http_port() -> u16 {
    8080
}

fn default_retention_days() -> u32 {
    30
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file for mention history.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Port of the HTTP intake surface; 0 disables it.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Days before mention history is soft-deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Slack behaviour.
    #[serde(default)]
    pub slack: SlackConfig,
    /// Queue connectivity.
    #[serde(default)]
    pub queue: QueueConfig,
    /// LLM provider.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Notion task store.
    #[serde(default)]
    pub notion: NotionConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that depend on the process role.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the in-memory queue is combined with
    /// a role that cannot share it.
    pub fn validate_for_role(&self, role: Role) -> Result<()> {
        if self.queue.backend == QueueBackend::Memory && role != Role::All {
            return Err(AppError::Config(
                "queue.backend = \"memory\" requires --role all".into(),
            ));
        }
        Ok(())
    }

    /// Load credentials from OS keychain with env-var fallback.
    ///
    /// Which credentials are required depends on `role`: the listener needs
    /// both Slack tokens, the worker needs the bot token, the LLM key and
    /// (when enabled) the Notion key. Queue keys are required for the SQS
    /// backend only.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first missing credential.
    pub async fn load_credentials(&mut self, role: Role) -> Result<()> {
        self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        if role.runs_listener() {
            self.slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN").await?;
        }

        if self.queue.backend == QueueBackend::Sqs {
            self.queue.access_key_id =
                load_credential("aws_access_key_id", "AWS_ACCESS_KEY_ID").await?;
            self.queue.secret_access_key =
                load_credential("aws_secret_access_key", "AWS_SECRET_ACCESS_KEY").await?;
        }

        if role.runs_worker() {
            self.llm.api_key = match self.llm.provider {
                LlmProvider::Anthropic => {
                    load_credential("anthropic_api_key", "ANTHROPIC_API_KEY").await?
                }
                LlmProvider::Gemini => load_credential("gemini_api_key", "GEMINI_API_KEY").await?,
            };
            if self.notion.enabled {
                self.notion.api_key = load_credential("notion_api_key", "NOTION_API_KEY").await?;
            }
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let queue = &self.queue;
        if queue.queue_name.trim().is_empty() && queue.queue_url.is_none() {
            return Err(AppError::Config("queue.queue_name must not be empty".into()));
        }
        if queue.max_receive_count == 0 {
            return Err(AppError::Config(
                "queue.max_receive_count must be greater than zero".into(),
            ));
        }
        if queue.wait_seconds > 20 {
            return Err(AppError::Config(
                "queue.wait_seconds must be between 0 and 20".into(),
            ));
        }
        if queue.visibility_timeout_seconds == 0 {
            return Err(AppError::Config(
                "queue.visibility_timeout_seconds must be greater than zero".into(),
            ));
        }
        if !(1..=10).contains(&queue.max_messages) {
            return Err(AppError::Config(
                "queue.max_messages must be between 1 and 10".into(),
            ));
        }
        if self.notion.enabled && self.notion.database_id.trim().is_empty() {
            return Err(AppError::Config(
                "notion.database_id is required when notion is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(keyring::Error::NoEntry) => {}
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
