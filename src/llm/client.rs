//! Chat-completion client abstraction.

use crate::types::{AppError, ChatMessage, Result};
use async_trait::async_trait;
use std::time::Duration;

/// One chat-completion request: role-tagged messages plus sampling limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            messages,
            temperature,
            max_tokens,
        }
    }
}

/// Generic LLM client trait for provider abstraction
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Return the single text completion for `request`.
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Provider enum for runtime selection
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI API or any compatible endpoint (Azure OpenAI, OpenRouter, vLLM)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4-turbo".to_string(),
    ///     timeout: Duration::from_secs(60),
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
        timeout: Duration,
    },
}

impl Provider {
    /// Build the provider from the `[chat]` config section and its API key.
    pub fn from_config(config: &crate::utils::toml_config::ChatConfig, api_key: String) -> Self {
        Provider::OpenAI {
            api_key,
            api_base: config.api_base.clone(),
            model: config.model.clone(),
            timeout: config.timeout(),
        }
    }

    /// Create a client instance for this provider
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or the HTTP client cannot be built.
    pub fn create_client(&self) -> Result<Box<dyn LLMClient>> {
        match self {
            Provider::OpenAI {
                api_key,
                api_base,
                model,
                timeout,
            } => {
                if api_key.is_empty() {
                    return Err(AppError::Configuration(
                        "chat API key must not be empty".into(),
                    ));
                }
                Ok(Box::new(super::openai::OpenAIClient::new(
                    api_key.clone(),
                    api_base.clone(),
                    model.clone(),
                    *timeout,
                )?))
            }
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
        }
    }
}
