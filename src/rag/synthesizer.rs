//! Grounded answer synthesis.
//!
//! Retrieved chunks are laid out most-relevant first, each tagged with its
//! page and document, and sent to the chat model together with a fixed
//! system instruction. Sampling is kept cold and the output bounded.

use crate::llm::{ChatRequest, LLMClient};
use crate::types::{AppError, Answer, ChatMessage, Result, RetrievalResult, ServiceErrorKind};
use crate::utils::deadline::with_deadline;
use crate::utils::retry::RetryPolicy;
use crate::utils::toml_config::{ChatConfig, RetryConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Deadline for each completion request.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default(), &RetryConfig::default())
    }
}

impl SynthesisSettings {
    pub fn from_config(chat: &ChatConfig, retry: &RetryConfig) -> Self {
        Self {
            system_prompt: chat.system_prompt.clone(),
            temperature: chat.temperature,
            max_tokens: chat.max_tokens,
            timeout: chat.timeout(),
            retry: RetryPolicy::from_config(retry),
        }
    }
}

/// Render retrieved chunks as prompt context, in rank order.
pub fn build_context(retrieval: &RetrievalResult) -> String {
    retrieval
        .iter()
        .map(|chunk| {
            format!(
                "(Page {} from {}): {}",
                chunk.page_number, chunk.document_name, chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_user_message(question: &str, retrieval: &RetrievalResult) -> String {
    format!(
        "Context:\n{}\n\nQuestion: {}",
        build_context(retrieval),
        question
    )
}

pub struct AnswerSynthesizer {
    llm: Arc<dyn LLMClient>,
    settings: SynthesisSettings,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LLMClient>, settings: SynthesisSettings) -> Self {
        Self { llm, settings }
    }

    pub fn settings(&self) -> &SynthesisSettings {
        &self.settings
    }

    /// The exact request sent for `question` over `retrieval`.
    pub fn build_request(&self, question: &str, retrieval: &RetrievalResult) -> ChatRequest {
        ChatRequest::new(
            vec![
                ChatMessage::system(self.settings.system_prompt.clone()),
                ChatMessage::user(build_user_message(question, retrieval)),
            ],
            self.settings.temperature,
            self.settings.max_tokens,
        )
    }

    /// Ask the model to answer from `retrieval` and keep `retrieval` as the
    /// answer's sources.
    ///
    /// Weak or empty context is not an error; the model is expected to say
    /// it cannot answer. A blank completion is.
    pub async fn synthesize(
        &self,
        question: &str,
        retrieval: RetrievalResult,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let request = self.build_request(question, &retrieval);
        let started = Instant::now();

        let completion = self
            .settings
            .retry
            .run("synthesize", cancel, || {
                with_deadline(
                    self.llm.complete(&request),
                    self.settings.timeout,
                    cancel,
                    AppError::SynthesisTimeout,
                )
            })
            .await?;

        let text = completion.trim().to_string();
        if text.is_empty() {
            return Err(AppError::synthesis(
                ServiceErrorKind::InvalidResponse,
                "model returned an empty completion",
            ));
        }

        debug!(
            model = self.llm.model_name(),
            sources = retrieval.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "synthesized answer"
        );

        Ok(Answer {
            text,
            sources: retrieval,
        })
    }
}
