//! Retrieval Augmented Generation (RAG) Pipeline
//!
//! # Module Structure
//!
//! - [`rag::chunker`](crate::rag::chunker) - Token-window chunking with the embedding model's BPE
//! - [`rag::embeddings`](crate::rag::embeddings) - Embedding service client and batch driver
//! - [`rag::retriever`](crate::rag::retriever) - Question embedding and scoped similarity search
//! - [`rag::synthesizer`](crate::rag::synthesizer) - Prompt construction and grounded answers
//! - [`rag::ingest`](crate::rag::ingest) - Ingestion state machine
//! - [`rag::query`](crate::rag::query) - Question answering and menu selection
//!
//! # RAG Pipeline
//!
//! 1. **Ingestion** - Pages are read, chunked per page and embedded in batches
//! 2. **Storage** - All rows of a document are written in one store call
//! 3. **Retrieval** - The question is embedded once and searched within the selected documents
//! 4. **Generation** - The model answers from the ranked chunks, which are kept as sources
//!
//! # Example
//!
//! ```ignore
//! let report = ingestion.ingest(Path::new("q3.pdf"), "q3-report", &cancel).await?;
//!
//! let answer = query
//!     .ask("What drove margin growth?", &["q3-report".into()], None, &cancel)
//!     .await?;
//! for citation in answer.citations() {
//!     println!("{} p{}", citation.document_name, citation.page_number);
//! }
//! ```

pub mod chunker;
pub mod embeddings;
pub mod ingest;
pub mod query;
pub mod retriever;
pub mod synthesizer;

pub use chunker::{chunk_text, TiktokenTokenizer, TokenChunker, Tokenizer};
pub use embeddings::{embed_all, embed_query, EmbedSettings, Embedder, OpenAIEmbedder};
pub use ingest::IngestionOrchestrator;
pub use query::{parse_selection, QueryOrchestrator};
pub use retriever::{Retriever, DEFAULT_TOP_K};
pub use synthesizer::{AnswerSynthesizer, SynthesisSettings};
