use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============= Ingestion Types =============

/// Extracted text of a single source page.
///
/// Page numbers are 1-based and contiguous within a document. Image-only
/// pages carry an empty `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

impl PageText {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A chunk ready to be persisted: page provenance, text and its embedding.
///
/// The owning document name is supplied separately to
/// [`VectorStore::insert`](crate::db::VectorStore::insert).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRow {
    pub page_number: u32,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// How an ingestion treats rows already stored under the same document name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Keep existing rows and add the new ones next to them.
    #[default]
    Append,
    /// Atomically swap the existing rows for the new ones.
    Replace,
}

impl IngestMode {
    pub fn from_replace_flag(replace: bool) -> Self {
        if replace {
            Self::Replace
        } else {
            Self::Append
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// Summary of a finished ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_name: String,
    pub mode: IngestMode,
    /// Number of pages read from the source.
    pub pages: usize,
    /// Pages that produced no chunks (empty or whitespace-only text).
    pub empty_pages: usize,
    /// Rows written to the store.
    pub chunks: usize,
    pub ingested_at: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============= Retrieval Types =============

/// A stored chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub document_name: String,
    pub page_number: u32,
    pub content: String,
    /// Distance to the query under the store's metric; lower is closer.
    pub distance: f32,
}

/// Chunks ranked by non-decreasing distance to a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RetrievedChunk> {
        self.chunks.iter()
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a RetrievedChunk;
    type IntoIter = std::slice::Iter<'a, RetrievedChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

/// A (document, page) pair an answer can cite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub document_name: String,
    pub page_number: u32,
}

/// A grounded answer together with the exact retrieval it was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: RetrievalResult,
}

impl Answer {
    /// Distinct (document, page) pairs in retrieval rank order.
    pub fn citations(&self) -> Vec<Citation> {
        let mut seen = std::collections::HashSet::new();
        self.sources
            .iter()
            .filter(|chunk| seen.insert((chunk.document_name.as_str(), chunk.page_number)))
            .map(|chunk| Citation {
                document_name: chunk.document_name.clone(),
                page_number: chunk.page_number,
            })
            .collect()
    }
}

// ============= LLM Message Types =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ============= Error Types =============

/// Classification of a remote service failure, used to decide retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceErrorKind {
    /// Network failure or 5xx response; safe to retry.
    Transient,
    /// 429 response; retry after backing off.
    RateLimited,
    /// 401/403 response; never retried.
    Auth,
    /// Any other 4xx response.
    Rejected,
    /// The service answered but the payload was unusable.
    InvalidResponse,
}

impl ServiceErrorKind {
    /// Classify an HTTP status code returned by a service.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimited,
            500..=599 => Self::Transient,
            _ => Self::Rejected,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::RateLimited => "rate limited",
            Self::Auth => "auth",
            Self::Rejected => "rejected",
            Self::InvalidResponse => "invalid response",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Embedding service error ({kind}): {message}")]
    EmbeddingService {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("Embedding request timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("Synthesis service error ({kind}): {message}")]
    SynthesisService {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("Synthesis request timed out after {0:?}")]
    SynthesisTimeout(Duration),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Ingestion already in progress for document '{0}'")]
    IngestionInProgress(String),

    #[error("Store schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn embedding(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self::EmbeddingService {
            kind,
            message: message.into(),
        }
    }

    pub fn synthesis(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self::SynthesisService {
            kind,
            message: message.into(),
        }
    }

    /// Whether a caller may retry the failed operation with backoff.
    ///
    /// Auth failures and caller input errors are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EmbeddingTimeout(_) | Self::SynthesisTimeout(_) => true,
            Self::EmbeddingService { kind, .. } | Self::SynthesisService { kind, .. } => {
                kind.is_retryable()
            }
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::EmbeddingTimeout(_) | Self::SynthesisTimeout(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingService {
                kind: ServiceErrorKind::Auth,
                ..
            } | Self::SynthesisService {
                kind: ServiceErrorKind::Auth,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
