//! Document ingestion.
//!
//! ```text
//! ReadPages ─▶ ChunkPerPage ─▶ EmbedAll ─▶ PersistAll ─▶ Done
//! ```
//!
//! Any failing stage aborts the run. Nothing is written until every chunk
//! has an embedding, and the write is a single store call, so a document is
//! either fully present or absent.

use crate::db::VectorStore;
use crate::pdf::page_source_for;
use crate::rag::chunker::TokenChunker;
use crate::rag::embeddings::{embed_all, EmbedSettings, Embedder};
use crate::types::{AppError, ChunkRow, IngestMode, IngestReport, PageText, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

/// Drives chunking, embedding and persistence for one document at a time
/// per name.
///
/// The name is locked in the store for the whole run, so a second run for
/// the same document fails with `IngestionInProgress` even when it comes
/// from another orchestrator or process sharing the store.
#[derive(Clone)]
pub struct IngestionOrchestrator {
    chunker: TokenChunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    settings: EmbedSettings,
}

impl IngestionOrchestrator {
    pub fn new(
        chunker: TokenChunker,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        settings: EmbedSettings,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            settings,
        }
    }

    /// Ingest a file, appending to any rows already stored under the name.
    pub async fn ingest(
        &self,
        path: &Path,
        document_name: &str,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        self.ingest_path(path, document_name, IngestMode::Append, cancel)
            .await
    }

    /// Ingest a file again under an existing name, either appending or
    /// atomically replacing the stored rows.
    pub async fn reingest(
        &self,
        path: &Path,
        document_name: &str,
        replace: bool,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        self.ingest_path(
            path,
            document_name,
            IngestMode::from_replace_flag(replace),
            cancel,
        )
        .await
    }

    pub async fn ingest_path(
        &self,
        path: &Path,
        document_name: &str,
        mode: IngestMode,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let name = normalize_name(document_name)?;
        let _lock = self.store.lock_document(&name).await?;
        let span = tracing::info_span!("ingest", run_id = %Uuid::new_v4(), document = %name, %mode);

        async {
            let source = page_source_for(path);
            debug!(stage = "read_pages", source = source.name(), path = %path.display());
            let pages = source.read_pages(path).await?;
            self.run(&name, pages, mode, cancel).await
        }
        .instrument(span)
        .await
    }

    /// Ingest pages that were already extracted.
    pub async fn ingest_pages(
        &self,
        document_name: &str,
        pages: Vec<PageText>,
        mode: IngestMode,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let name = normalize_name(document_name)?;
        let _lock = self.store.lock_document(&name).await?;
        let span = tracing::info_span!("ingest", run_id = %Uuid::new_v4(), document = %name, %mode);

        self.run(&name, pages, mode, cancel).instrument(span).await
    }

    async fn run(
        &self,
        name: &str,
        pages: Vec<PageText>,
        mode: IngestMode,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let started = Instant::now();

        // ChunkPerPage
        let mut tagged: Vec<(u32, String)> = Vec::new();
        let mut empty_pages = 0;
        for page in &pages {
            if page.is_blank() {
                empty_pages += 1;
                continue;
            }
            let before = tagged.len();
            tagged.extend(
                self.chunker
                    .chunk(&page.text)
                    .into_iter()
                    .map(|content| (page.number, content)),
            );
            debug!(stage = "chunk", page = page.number, chunks = tagged.len() - before);
        }

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        // EmbedAll
        let texts: Vec<String> = tagged.iter().map(|(_, content)| content.clone()).collect();
        debug!(stage = "embed", chunks = texts.len());
        let vectors = embed_all(self.embedder.as_ref(), &texts, &self.settings, cancel).await?;

        let rows: Vec<ChunkRow> = tagged
            .into_iter()
            .zip(vectors)
            .map(|((page_number, content), embedding)| ChunkRow {
                page_number,
                content,
                embedding,
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        // PersistAll
        debug!(stage = "persist", chunks = rows.len());
        let written = match mode {
            IngestMode::Append if rows.is_empty() => 0,
            IngestMode::Append => self.store.insert(name, &rows).await?,
            IngestMode::Replace => self.store.replace_document(name, &rows).await?,
        };

        let report = IngestReport {
            document_name: name.to_string(),
            mode,
            pages: pages.len(),
            empty_pages,
            chunks: written,
            ingested_at: Utc::now(),
            elapsed: started.elapsed(),
        };

        info!(
            pages = report.pages,
            empty_pages = report.empty_pages,
            chunks = report.chunks,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "ingestion complete"
        );

        Ok(report)
    }
}

/// Trim a document name, rejecting names that are empty afterwards.
pub fn normalize_name(document_name: &str) -> Result<String> {
    let name = document_name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidQuery(
            "document name must not be empty".to_string(),
        ));
    }
    Ok(name.to_string())
}
