//! Mock implementations for testing.
//!
//! Deterministic stand-ins for the tokenizer, embedding service and chat
//! model, shared across the integration suites.

use async_trait::async_trait;
use folio::llm::{ChatRequest, LLMClient};
use folio::rag::{Embedder, Tokenizer};
use folio::types::{AppError, Result, ServiceErrorKind};
use folio::FolioConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One whitespace-separated word per token.
///
/// Decoding joins words with single spaces, so chunk sizes in tests are
/// plain word counts.
#[derive(Default)]
pub struct WordTokenizer {
    vocab: Mutex<(HashMap<String, u32>, Vec<String>)>,
}

impl WordTokenizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tokenizer for WordTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        let mut vocab = self.vocab.lock();
        let (ids, words) = &mut *vocab;
        text.split_whitespace()
            .map(|word| {
                *ids.entry(word.to_string()).or_insert_with(|| {
                    words.push(word.to_string());
                    (words.len() - 1) as u32
                })
            })
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        let vocab = self.vocab.lock();
        tokens
            .iter()
            .filter_map(|&id| vocab.1.get(id as usize).map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn name(&self) -> &str {
        "words"
    }
}

/// Keywords the [`KeywordEmbedder`] counts, one dimension each.
pub const KEYWORDS: [&str; 4] = ["revenue", "margin", "risk", "staff"];

/// Embeds a text as keyword counts plus a constant bias dimension.
///
/// Texts sharing keywords land close together under L2, which makes
/// retrieval order predictable.
pub struct KeywordEmbedder {
    calls: AtomicUsize,
    delay: Option<Duration>,
    fail_with: Option<ServiceErrorKind>,
    fail_marker: Option<String>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: None,
            fail_with: None,
            fail_marker: None,
        }
    }

    /// Sleep before answering every request.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Fail every request with the given kind.
    pub fn failing(kind: ServiceErrorKind) -> Self {
        Self {
            fail_with: Some(kind),
            ..Self::new()
        }
    }

    /// Fail only requests containing a text with `marker` in it.
    pub fn failing_on(marker: &str, kind: ServiceErrorKind) -> Self {
        Self {
            fail_with: Some(kind),
            fail_marker: Some(marker.to_string()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = KEYWORDS
            .iter()
            .map(|keyword| lower.matches(keyword).count() as f32)
            .collect();
        vector.push(1.0);
        vector
    }
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = self.fail_with {
            let hit = match &self.fail_marker {
                Some(marker) => texts.iter().any(|text| text.contains(marker.as_str())),
                None => true,
            };
            if hit {
                return Err(AppError::embedding(kind, "mock embedding failure"));
            }
        }
        Ok(texts.iter().map(|text| Self::vector_for(text)).collect())
    }

    fn model_name(&self) -> &str {
        "keyword-mock"
    }

    fn dimensions(&self) -> usize {
        KEYWORDS.len() + 1
    }
}

/// Mock chat model returning a fixed completion and recording every request.
pub struct MockLLMClient {
    response: String,
    should_fail: bool,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockLLMClient {
    /// Create a new mock client that returns the given response.
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            should_fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock client that always fails with a transient error.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new("")
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().push(request.clone());
        if self.should_fail {
            return Err(AppError::synthesis(
                ServiceErrorKind::Transient,
                "Mock LLM failure",
            ));
        }
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

/// Configuration matching the mocks: keyword dimensions, L2, in-memory store.
pub fn test_config(chunk_size: usize) -> FolioConfig {
    let mut config = FolioConfig::default();
    config.embedding.dimensions = KEYWORDS.len() + 1;
    config.embedding.metric = "l2".to_string();
    config.embedding.batch_size = 2;
    config.embedding.max_concurrency = 2;
    config.database.backend = folio::utils::toml_config::StoreBackend::Memory;
    config.rag.chunk_size = chunk_size;
    config.rag.top_k = 5;
    config
}
