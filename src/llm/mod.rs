//! LLM Provider Clients and Abstractions
//!
//! Answer synthesis talks to a chat-completion service through the
//! [`LLMClient`] trait. The only provider is an OpenAI-compatible REST
//! client; tests substitute their own implementations.

/// Core LLM client trait and request types.
pub mod client;

/// OpenAI-compatible chat completions over REST.
pub mod openai;

pub use client::{ChatRequest, LLMClient, Provider};
pub use openai::OpenAIClient;
