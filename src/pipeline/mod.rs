//! Intent pipeline.
//!
//! A fixed sequence of model calls: analyze → reply → evaluate → draft
//! task (only when the evaluation asks for one, or the intent is already
//! `task_creation`). Any model failure fails the whole run; nothing is
//! cached between attempts.

pub mod llm;
pub mod parse;
pub mod prompts;

use std::sync::Arc;

use tracing::{debug, info};

use crate::models::envelope::MentionEnvelope;
use crate::models::intent::{Intent, PipelineOutcome};
use crate::{AppError, Result};

use self::llm::LlmClient;

/// Runs the model calls for one mention.
pub struct IntentPipeline {
    llm: Arc<dyn LlmClient>,
}

impl IntentPipeline {
    /// Create a pipeline over `llm`.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Classify the mention, write a reply, and optionally draft a task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Llm` if any model call fails or the reply is empty.
    pub async fn process(&self, envelope: &MentionEnvelope) -> Result<PipelineOutcome> {
        let text = envelope.prompt_text();

        let raw = self.llm.complete(prompts::analysis(&text)).await?;
        let analysis = parse::parse_analysis(&raw);
        debug!(intent = analysis.intent.as_str(), summary = %analysis.summary, "mention analyzed");

        let reply = self
            .llm
            .complete(prompts::reply(envelope.user_id(), &text, &analysis))
            .await?
            .trim()
            .to_owned();
        if reply.is_empty() {
            return Err(AppError::Llm("model produced an empty reply".into()));
        }

        let raw = self.llm.complete(prompts::evaluation(&text, &analysis)).await?;
        let needs_task =
            parse::parse_needs_task(&raw) || analysis.intent == Intent::TaskCreation;

        let task = if needs_task {
            let raw = self.llm.complete(prompts::task(&text, &analysis)).await?;
            Some(parse::parse_task(&raw, &text))
        } else {
            None
        };

        info!(
            intent = analysis.intent.as_str(),
            needs_task,
            channel = envelope.channel_id(),
            "pipeline completed"
        );
        Ok(PipelineOutcome {
            intent: analysis.intent,
            reply,
            task,
        })
    }
}
