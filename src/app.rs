//! Caller-facing entry point.
//!
//! [`Folio`] wires configuration into the pipeline components and exposes
//! the operations any front end needs: ingest, re-ingest, list, ask and
//! delete.

use crate::db::{StoreSchema, VectorStore, VectorStoreProvider};
use crate::llm::{LLMClient, Provider};
use crate::rag::chunker::{TiktokenTokenizer, TokenChunker, Tokenizer};
use crate::rag::embeddings::{EmbedSettings, Embedder, OpenAIEmbedder};
use crate::rag::ingest::{normalize_name, IngestionOrchestrator};
use crate::rag::query::QueryOrchestrator;
use crate::rag::retriever::Retriever;
use crate::rag::synthesizer::{AnswerSynthesizer, SynthesisSettings};
use crate::types::{AppError, Answer, IngestMode, IngestReport, PageText, Result};
use crate::utils::toml_config::FolioConfig;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Folio {
    config: FolioConfig,
    store: Arc<dyn VectorStore>,
    ingestion: IngestionOrchestrator,
    query: QueryOrchestrator,
    cancel: CancellationToken,
}

impl Folio {
    /// Build every component from configuration.
    ///
    /// API keys are read from the environment variables the config names.
    /// The store is opened (and created on first use) with the configured
    /// metric and dimensionality.
    ///
    /// # Errors
    ///
    /// `Configuration` for invalid settings or missing keys,
    /// `StoreUnavailable` if the database cannot be reached and
    /// `SchemaMismatch` if it was created for a different embedding setup.
    pub async fn from_config(config: FolioConfig) -> Result<Self> {
        config.validate()?;

        let embedding_key = config.embedding_api_key()?;
        let chat_key = config.chat_api_key()?;

        let tokenizer: Arc<dyn Tokenizer> = Arc::new(TiktokenTokenizer::from_settings(
            &config.embedding.model,
            config.rag.tokenizer_encoding.as_deref(),
        )?);
        let embedder: Arc<dyn Embedder> =
            Arc::new(OpenAIEmbedder::new(embedding_key, &config.embedding)?);
        let llm: Arc<dyn LLMClient> =
            Arc::from(Provider::from_config(&config.chat, chat_key).create_client()?);

        let schema = expected_schema(&config)?;
        let store = VectorStoreProvider::from_config(&config.database)?
            .create_store(schema)
            .await?;

        info!(
            store = store.provider_name(),
            embedding_model = embedder.model_name(),
            chat_model = llm.model_name(),
            tokenizer = tokenizer.name(),
            "folio ready"
        );

        Self::from_parts(config, tokenizer, embedder, llm, store)
    }

    /// Assemble from ready-made components.
    ///
    /// The store's schema and the embedder's dimensionality are checked
    /// against the configuration.
    pub fn from_parts(
        config: FolioConfig,
        tokenizer: Arc<dyn Tokenizer>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LLMClient>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let schema = expected_schema(&config)?;
        store.schema().validate_against(&schema)?;

        if embedder.dimensions() != schema.dimensions {
            return Err(AppError::Configuration(format!(
                "embedder '{}' produces {} dimensions, config expects {}",
                embedder.model_name(),
                embedder.dimensions(),
                schema.dimensions
            )));
        }

        let embed_settings = EmbedSettings::from_config(&config.embedding, &config.retry);
        let chunker = TokenChunker::new(tokenizer, config.rag.chunk_size)?;

        let ingestion = IngestionOrchestrator::new(
            chunker,
            Arc::clone(&embedder),
            Arc::clone(&store),
            embed_settings.clone(),
        );

        let retriever = Retriever::new(embedder, Arc::clone(&store), embed_settings)
            .with_default_top_k(config.rag.top_k);
        let synthesizer = Arc::new(AnswerSynthesizer::new(
            llm,
            SynthesisSettings::from_config(&config.chat, &config.retry),
        ));

        Ok(Self {
            config,
            store,
            ingestion,
            query: QueryOrchestrator::new(retriever, synthesizer),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Token whose cancellation aborts every in-flight operation.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ingest a PDF or text file, appending to any existing rows.
    pub async fn ingest(&self, path: &Path, document_name: &str) -> Result<IngestReport> {
        self.ingestion
            .ingest(path, document_name, &self.cancel.child_token())
            .await
    }

    /// Ingest a file again, replacing the stored rows when `replace` is set.
    pub async fn reingest(
        &self,
        path: &Path,
        document_name: &str,
        replace: bool,
    ) -> Result<IngestReport> {
        self.ingestion
            .reingest(path, document_name, replace, &self.cancel.child_token())
            .await
    }

    /// Ingest pages extracted elsewhere.
    pub async fn ingest_pages(
        &self,
        document_name: &str,
        pages: Vec<PageText>,
        mode: IngestMode,
    ) -> Result<IngestReport> {
        self.ingestion
            .ingest_pages(document_name, pages, mode, &self.cancel.child_token())
            .await
    }

    /// Stored document names, sorted.
    pub async fn list_documents(&self) -> Result<Vec<String>> {
        self.store.list_documents().await
    }

    /// Answer a question from the selected documents.
    ///
    /// `top_k` defaults to `rag.top_k`.
    pub async fn ask(
        &self,
        question: &str,
        document_names: &[String],
        top_k: Option<usize>,
    ) -> Result<Answer> {
        self.query
            .ask(question, document_names, top_k, &self.cancel.child_token())
            .await
    }

    /// Remove every chunk of a document, returning how many were deleted.
    pub async fn delete_document(&self, document_name: &str) -> Result<usize> {
        let name = normalize_name(document_name)?;
        let deleted = self.store.delete_document(&name).await?;
        info!(document = %name, chunks = deleted, "deleted document");
        Ok(deleted)
    }
}

fn expected_schema(config: &FolioConfig) -> Result<StoreSchema> {
    Ok(StoreSchema::new(
        config.embedding.distance_metric()?,
        config.embedding.dimensions,
    ))
}
