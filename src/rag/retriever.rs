use crate::db::VectorStore;
use crate::rag::embeddings::{embed_query, EmbedSettings, Embedder};
use crate::types::{AppError, Result, RetrievalResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Chunks retrieved per question when the caller does not say otherwise.
pub const DEFAULT_TOP_K: usize = 5;

/// Embeds a question once and searches the store within a document selection.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    settings: EmbedSettings,
    default_top_k: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        settings: EmbedSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            settings,
            default_top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Top-`top_k` chunks for `question` among `document_names`.
    ///
    /// The selection and `top_k` are validated before any embedding call is
    /// made. Repeated names are searched once.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for an empty selection or `top_k == 0`; embedding and
    /// store errors propagate unchanged.
    pub async fn retrieve(
        &self,
        question: &str,
        document_names: &[String],
        top_k: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        if top_k == 0 {
            return Err(AppError::InvalidQuery(
                "top_k must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let selection: Vec<String> = document_names
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect();
        if selection.is_empty() {
            return Err(AppError::InvalidQuery(
                "select at least one document".to_string(),
            ));
        }

        let started = Instant::now();
        let query = embed_query(self.embedder.as_ref(), question, &self.settings, cancel).await?;
        let chunks = self.store.search(&query, &selection, top_k).await?;

        debug!(
            documents = selection.len(),
            top_k,
            hits = chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieved chunks"
        );

        Ok(RetrievalResult::new(chunks))
    }
}
