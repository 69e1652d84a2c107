//! Text embedding.
//!
//! [`Embedder`] maps texts to fixed-length vectors, one per input, in input
//! order. [`OpenAIEmbedder`] calls an OpenAI-compatible `/embeddings`
//! endpoint. [`embed_all`] drives an embedder over many texts in bounded,
//! concurrent batches.

use crate::llm::openai::error_detail;
use crate::types::{AppError, Result, ServiceErrorKind};
use crate::utils::deadline::with_deadline;
use crate::utils::retry::RetryPolicy;
use crate::utils::toml_config::{EmbeddingConfig, RetryConfig};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every text, returning vectors in input order.
    ///
    /// `embed(&[t])[0]` and `embed(&[t, u])[0]` must be the same vector.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;

    /// Length of every returned vector.
    fn dimensions(&self) -> usize;
}

// ============= OpenAI embeddings =============

/// Embedder for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
}

impl OpenAIEmbedder {
    pub fn new(api_key: impl Into<String>, config: &EmbeddingConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AppError::Configuration(
                "embedding API key must not be empty".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
            timeout: config.timeout(),
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            return AppError::EmbeddingTimeout(self.timeout);
        }
        error!(provider = "openai", error = %err, "embedding request failed");
        AppError::embedding(ServiceErrorKind::Transient, format!("request failed: {}", err))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, batch_size = texts.len(), "embedding batch");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(provider = "openai", %status, "embedding API error");
            return Err(AppError::embedding(
                ServiceErrorKind::from_status(status.as_u16()),
                format!("API returned {}: {}", status, error_detail(body)),
            ));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                return AppError::EmbeddingTimeout(self.timeout);
            }
            AppError::embedding(
                ServiceErrorKind::InvalidResponse,
                format!("failed to parse response: {}", e),
            )
        })?;

        if parsed.data.len() != texts.len() {
            return Err(AppError::embedding(
                ServiceErrorKind::InvalidResponse,
                format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.data.len()
                ),
            ));
        }

        parsed.data.sort_by_key(|item| item.index);
        let in_order = parsed
            .data
            .iter()
            .enumerate()
            .all(|(position, item)| position == item.index);
        if !in_order {
            return Err(AppError::embedding(
                ServiceErrorKind::InvalidResponse,
                "embedding indices do not cover the request",
            ));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ============= Batch driver =============

/// How [`embed_all`] and [`embed_query`] call an embedder.
#[derive(Debug, Clone)]
pub struct EmbedSettings {
    /// Texts per request.
    pub batch_size: usize,
    /// Requests in flight at once.
    pub max_concurrency: usize,
    /// Deadline for each request.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self::from_config(&EmbeddingConfig::default(), &RetryConfig::default())
    }
}

impl EmbedSettings {
    pub fn from_config(embedding: &EmbeddingConfig, retry: &RetryConfig) -> Self {
        Self {
            batch_size: embedding.batch_size.max(1),
            max_concurrency: embedding.max_concurrency.max(1),
            timeout: embedding.timeout(),
            retry: RetryPolicy::from_config(retry),
        }
    }
}

/// Embed one batch under the deadline and retry policy, then check its shape.
async fn embed_batch(
    embedder: &dyn Embedder,
    batch: &[String],
    settings: &EmbedSettings,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f32>>> {
    let vectors = settings
        .retry
        .run("embed", cancel, || {
            with_deadline(
                embedder.embed(batch),
                settings.timeout,
                cancel,
                AppError::EmbeddingTimeout,
            )
        })
        .await?;

    if vectors.len() != batch.len() {
        return Err(AppError::embedding(
            ServiceErrorKind::InvalidResponse,
            format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
        ));
    }

    let expected = embedder.dimensions();
    if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
        return Err(AppError::embedding(
            ServiceErrorKind::InvalidResponse,
            format!("expected {}-dimensional vectors, got {}", expected, bad.len()),
        ));
    }

    Ok(vectors)
}

/// Embed `texts` in batches, running up to `max_concurrency` batches at once.
///
/// Output order matches input order. The first failing batch aborts the
/// whole call and its error is returned; no partial result is produced.
pub async fn embed_all(
    embedder: &dyn Embedder,
    texts: &[String],
    settings: &EmbedSettings,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(settings.batch_size.max(1)))
        .map(|batch| embed_batch(embedder, batch, settings, cancel))
        .buffered(settings.max_concurrency.max(1))
        .try_collect()
        .await?;

    Ok(batches.into_iter().flatten().collect())
}

/// Embed a single query text.
pub async fn embed_query(
    embedder: &dyn Embedder,
    text: &str,
    settings: &EmbedSettings,
    cancel: &CancellationToken,
) -> Result<Vec<f32>> {
    let batch = [text.to_string()];
    embed_batch(embedder, &batch, settings, cancel)
        .await?
        .pop()
        .ok_or_else(|| {
            AppError::embedding(ServiceErrorKind::InvalidResponse, "empty embedding response")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encodes each text's length and first byte, counting calls.
    struct CountingEmbedder {
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on_call: None,
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_call == Some(call) {
                return Err(AppError::embedding(ServiceErrorKind::Rejected, "boom"));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, t.bytes().next().unwrap_or(0) as f32])
                .collect())
        }

        fn model_name(&self) -> &str {
            "counting"
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn settings(batch_size: usize, max_concurrency: usize) -> EmbedSettings {
        EmbedSettings {
            batch_size,
            max_concurrency,
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::none(),
        }
    }

    #[tokio::test]
    async fn test_embed_all_preserves_order_across_batches() {
        let embedder = CountingEmbedder::new();
        let texts: Vec<String> = (1..=7).map(|n| "x".repeat(n)).collect();

        let vectors = embed_all(&embedder, &texts, &settings(3, 2), &CancellationToken::new())
            .await
            .unwrap();

        let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_embed_all_empty_input_makes_no_calls() {
        let embedder = CountingEmbedder::new();
        let vectors = embed_all(&embedder, &[], &settings(4, 4), &CancellationToken::new())
            .await
            .unwrap();

        assert!(vectors.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embed_all_propagates_batch_failure() {
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
            fail_on_call: Some(1),
        };
        let texts: Vec<String> = (0..6).map(|n| format!("t{}", n)).collect();

        let result = embed_all(&embedder, &texts, &settings(2, 1), &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(AppError::EmbeddingService {
                kind: ServiceErrorKind::Rejected,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_single_and_batch_calls_agree() {
        let embedder = CountingEmbedder::new();
        let cancel = CancellationToken::new();

        let single = embed_query(&embedder, "alpha", &settings(8, 1), &cancel)
            .await
            .unwrap();
        let batch = embed_all(
            &embedder,
            &["alpha".to_string(), "beta".to_string()],
            &settings(8, 1),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(single, batch[0]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let embedder = CountingEmbedder::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = embed_all(&embedder, &["a".to_string()], &settings(1, 1), &cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
