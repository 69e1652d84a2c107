//! # folio
//!
//! Page-aware retrieval over PDF documents with grounded question answering.
//!
//! folio reads documents page by page, splits every page into token-bounded
//! chunks, embeds the chunks and stores them in a vector store together with
//! their document name and page number. Questions are answered by retrieving
//! the closest chunks from a chosen set of documents and handing them, most
//! relevant first, to a chat model. Every answer carries the chunks it was
//! built from, so sources can be cited by document and page.
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use folio::{Folio, FolioConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> folio::Result<()> {
//!     let config = FolioConfig::load("folio.toml")?;
//!     let folio = Folio::from_config(config).await?;
//!
//!     folio.ingest(Path::new("q3.pdf"), "q3-report").await?;
//!
//!     let answer = folio
//!         .ask("What drove margin growth?", &["q3-report".into()], None)
//!         .await?;
//!     println!("{}", answer.text);
//!     for citation in answer.citations() {
//!         println!("  {} p{}", citation.document_name, citation.page_number);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `pgvector` | PostgreSQL + pgvector store (default) |
//! | `minimal` | In-memory store only |
//!
//! ## Modules
//!
//! - [`app`] - The [`Folio`] facade
//! - [`db`] - Vector store trait and backends
//! - [`llm`] - Chat-completion clients
//! - [`pdf`] - Per-page text extraction
//! - [`rag`] - Chunking, embedding, retrieval, synthesis and orchestration
//! - [`types`] - Domain records and error handling
//! - [`utils`] - Configuration, retries and deadlines

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Caller-facing facade.
pub mod app;
/// Command-line interface.
pub mod cli;
/// Vector stores (pgvector, in-memory).
pub mod db;
/// LLM provider clients and abstractions.
pub mod llm;
/// PDF and plain-text page sources.
pub mod pdf;
/// Retrieval Augmented Generation (RAG) components.
pub mod rag;
/// Core types and errors.
pub mod types;
/// Configuration and remote-call helpers.
pub mod utils;

// Re-export commonly used types
pub use app::Folio;
pub use db::{
    DistanceMetric, DocumentLock, InMemoryVectorStore, StoreSchema, VectorStore,
    VectorStoreProvider,
};
pub use llm::{ChatRequest, LLMClient, Provider};
pub use rag::{Embedder, IngestionOrchestrator, QueryOrchestrator, Tokenizer};
pub use types::{
    Answer, AppError, Citation, IngestMode, IngestReport, PageText, Result, RetrievalResult,
    RetrievedChunk, ServiceErrorKind,
};
pub use utils::toml_config::FolioConfig;

#[cfg(feature = "pgvector")]
pub use db::PgVectorStore;
