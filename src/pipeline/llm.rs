//! LLM provider clients.
//!
//! Both providers are reached over plain HTTPS with `reqwest`; only the
//! text of the first completion is used.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{LlmConfig, LlmProvider};
use crate::{AppError, Result};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const ERROR_BODY_LIMIT: usize = 300;

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// System instructions.
    pub system: String,
    /// User turn.
    pub prompt: String,
}

impl CompletionRequest {
    /// Build a request from system and user text.
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// Text completion provider.
pub trait LlmClient: Send + Sync {
    /// Run one completion and return the generated text.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Llm`](crate::AppError::Llm) on transport failure,
    /// a non-success status, or a response without text.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// Build the configured provider client.
///
/// # Errors
///
/// Returns `AppError::Llm` if the HTTP client cannot be constructed.
pub fn build_llm(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    Ok(match config.provider {
        LlmProvider::Anthropic => Arc::new(AnthropicClient::new(config)?),
        LlmProvider::Gemini => Arc::new(GeminiClient::new(config)?),
    })
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|err| AppError::Llm(format!("failed to build http client: {err}")))
}

async fn read_success(response: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    Err(AppError::Llm(format!("{provider} returned {status}: {body}")))
}

// ── Anthropic Messages API ──────────────────────────────────────

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [AnthropicMessage<'a>; 1],
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicClient {
    /// Create a client from LLM configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Llm` if the HTTP client cannot be constructed.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_owned()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    async fn complete_inner(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: &request.system,
            messages: [AnthropicMessage {
                role: "user",
                content: &request.prompt,
            }],
        };
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::Llm(format!("anthropic request failed: {err}")))?;
        let parsed: AnthropicResponse = read_success(response, "anthropic")
            .await?
            .json()
            .await
            .map_err(|err| AppError::Llm(format!("anthropic response unreadable: {err}")))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        if text.trim().is_empty() {
            return Err(AppError::Llm("anthropic returned no text".into()));
        }
        debug!(model = %self.model, chars = text.len(), "anthropic completion received");
        Ok(text)
    }
}

impl LlmClient for AnthropicClient {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move { self.complete_inner(&request).await })
    }
}

// ── Gemini generateContent ──────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: [GeminiContent<'a>; 1],
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl GeminiClient {
    /// Create a client from LLM configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Llm` if the HTTP client cannot be constructed.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_owned()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    async fn complete_inner(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: [GeminiPart {
                    text: &request.system,
                }],
            },
            contents: [GeminiContent {
                role: Some("user"),
                parts: [GeminiPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.max_tokens,
                temperature: self.temperature,
            },
        };
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::Llm(format!("gemini request failed: {err}")))?;
        let parsed: GeminiResponse = read_success(response, "gemini")
            .await?
            .json()
            .await
            .map_err(|err| AppError::Llm(format!("gemini response unreadable: {err}")))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AppError::Llm("gemini returned no text".into()));
        }
        debug!(model = %self.model, chars = text.len(), "gemini completion received");
        Ok(text)
    }
}

impl LlmClient for GeminiClient {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move { self.complete_inner(&request).await })
    }
}
