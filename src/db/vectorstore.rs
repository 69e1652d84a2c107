//! Vector Store Abstraction Layer
//!
//! Chunk rows (document name, page number, content, embedding) are owned
//! exclusively by a [`VectorStore`]. Two backends implement the trait:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       VectorStore Trait                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ insert │ replace_document │ delete_document │ search │ ...   │
//! └──────────────────────────────────────────────────────────────┘
//!              ▲                                  ▲
//!        ┌─────┴──────┐                    ┌──────┴──────┐
//!        │  pgvector  │                    │  In-memory  │
//!        │ (default)  │                    │  (testing)  │
//!        └────────────┘                    └─────────────┘
//! ```
//!
//! The distance metric is part of the store's [`StoreSchema`], fixed when the
//! store is created. Queries never pick a metric of their own.
//!
//! # Example
//!
//! ```rust,ignore
//! use folio::db::{DistanceMetric, StoreSchema, VectorStoreProvider};
//!
//! let schema = StoreSchema::new(DistanceMetric::L2, 1536);
//! let store = VectorStoreProvider::InMemory.create_store(schema).await?;
//!
//! store.insert("annual-report", &rows).await?;
//! let hits = store.search(&query, &["annual-report".into()], 5).await?;
//! ```

use crate::types::{AppError, ChunkRow, Result, RetrievedChunk};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Version of the on-disk layout, bumped whenever the row format changes.
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Distance Metric
// ============================================================================

/// Distance function a store ranks by. Lower is always closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance (pgvector `<->`).
    #[default]
    L2,
    /// One minus cosine similarity (pgvector `<=>`).
    Cosine,
    /// Negated inner product (pgvector `<#>`).
    InnerProduct,
}

impl DistanceMetric {
    pub fn name(&self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Cosine => "cosine",
            Self::InnerProduct => "inner_product",
        }
    }

    /// pgvector operator implementing this metric.
    pub fn operator(&self) -> &'static str {
        match self {
            Self::L2 => "<->",
            Self::Cosine => "<=>",
            Self::InnerProduct => "<#>",
        }
    }

    /// Distance between two equal-length vectors.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }

                1.0 - dot / (norm_a * norm_b)
            }
            Self::InnerProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Self::L2),
            "cosine" => Ok(Self::Cosine),
            "inner_product" | "ip" | "dot" => Ok(Self::InnerProduct),
            other => Err(format!(
                "unknown distance metric '{}' (expected l2, cosine or inner_product)",
                other
            )),
        }
    }
}

// ============================================================================
// Store Schema
// ============================================================================

/// Versioned description of what a store holds and how it ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    pub version: u32,
    pub metric: DistanceMetric,
    pub dimensions: usize,
}

impl StoreSchema {
    pub fn new(metric: DistanceMetric, dimensions: usize) -> Self {
        Self {
            version: SCHEMA_VERSION,
            metric,
            dimensions,
        }
    }

    /// Fail with [`AppError::SchemaMismatch`] unless `self` equals `expected`.
    pub fn validate_against(&self, expected: &StoreSchema) -> Result<()> {
        if self == expected {
            return Ok(());
        }
        Err(AppError::SchemaMismatch {
            expected: expected.to_string(),
            found: self.to_string(),
        })
    }

    /// Reject a vector whose length differs from the schema or that holds
    /// a NaN or infinite component.
    pub fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(AppError::InvalidQuery(format!(
                "vector has {} dimensions, store expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        if let Some(position) = vector.iter().position(|v| !v.is_finite()) {
            return Err(AppError::InvalidQuery(format!(
                "vector component {} is not a finite number",
                position
            )));
        }
        Ok(())
    }
}

impl fmt::Display for StoreSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{} {} x{}",
            self.version, self.metric, self.dimensions
        )
    }
}

/// Validate search arguments shared by every backend and return the
/// de-duplicated document selection.
pub(crate) fn search_scope(
    schema: &StoreSchema,
    query: &[f32],
    document_names: &[String],
) -> Result<Vec<String>> {
    if document_names.is_empty() {
        return Err(AppError::InvalidQuery(
            "search requires at least one document name".to_string(),
        ));
    }
    schema.check_vector(query)?;

    let mut seen = HashSet::new();
    Ok(document_names
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect())
}

// ============================================================================
// Document Lock
// ============================================================================

/// Exclusive claim on a document name for the length of one ingestion.
///
/// Held across processes when the backend supports it. Released on drop.
#[must_use = "the lock is released as soon as it is dropped"]
pub struct DocumentLock {
    document_name: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl DocumentLock {
    pub fn new(document_name: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            document_name: document_name.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn document_name(&self) -> &str {
        &self.document_name
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for DocumentLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentLock")
            .field("document_name", &self.document_name)
            .finish()
    }
}

// ============================================================================
// Vector Store Provider Configuration
// ============================================================================

/// Backend selection plus the connection settings it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum VectorStoreProvider {
    /// PostgreSQL with the pgvector extension.
    #[cfg(feature = "pgvector")]
    PgVector {
        connection_string: String,
        /// Applied on top of `connection_string`; never serialized.
        #[serde(default, skip_serializing)]
        password: Option<String>,
        table: String,
        max_connections: u32,
        connect_timeout_secs: u64,
    },

    /// Process-local store. Data is lost when the process exits.
    InMemory,
}

impl VectorStoreProvider {
    /// Build a provider from the `[database]` config section.
    pub fn from_config(config: &crate::utils::toml_config::DatabaseConfig) -> Result<Self> {
        use crate::utils::toml_config::StoreBackend;

        match config.backend {
            StoreBackend::Memory => Ok(Self::InMemory),
            #[cfg(feature = "pgvector")]
            StoreBackend::Postgres => Ok(Self::PgVector {
                connection_string: config.connection_url(),
                password: config.password(),
                table: config.table.clone(),
                max_connections: config.max_connections,
                connect_timeout_secs: config.connect_timeout_secs,
            }),
            #[allow(unreachable_patterns)]
            _ => Err(AppError::Configuration(
                "PostgreSQL backend requires the 'pgvector' feature".into(),
            )),
        }
    }

    /// Connect to the backend and make sure it holds `schema`.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the backend cannot be reached, `SchemaMismatch`
    /// if it was created with a different metric or dimensionality.
    pub async fn create_store(&self, schema: StoreSchema) -> Result<Arc<dyn VectorStore>> {
        match self {
            #[cfg(feature = "pgvector")]
            VectorStoreProvider::PgVector {
                connection_string,
                password,
                table,
                max_connections,
                connect_timeout_secs,
            } => {
                let options =
                    super::pgvector::connect_options(connection_string, password.as_deref())?;
                let store = super::pgvector::PgVectorStore::connect_with(
                    options,
                    table,
                    schema,
                    *max_connections,
                    std::time::Duration::from_secs(*connect_timeout_secs),
                )
                .await?;
                Ok(Arc::new(store))
            }

            VectorStoreProvider::InMemory => Ok(Arc::new(InMemoryVectorStore::new(schema))),
        }
    }
}

// ============================================================================
// Vector Store Trait
// ============================================================================

/// Persistence and nearest-neighbour search over chunk rows.
///
/// Every write is all-or-nothing: a concurrent `search` sees either none or
/// all of the rows passed to one `insert` or `replace_document` call.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Get the name of this vector store provider.
    fn provider_name(&self) -> &'static str;

    /// Schema the store was created with.
    fn schema(&self) -> &StoreSchema;

    /// Append rows for a document. Duplicate rows are accepted.
    ///
    /// Returns the number of rows written.
    async fn insert(&self, document_name: &str, rows: &[ChunkRow]) -> Result<usize>;

    /// Remove every row of `document_name` and write `rows` in one atomic step.
    async fn replace_document(&self, document_name: &str, rows: &[ChunkRow]) -> Result<usize>;

    /// Claim `document_name` for one ingestion run.
    ///
    /// # Errors
    ///
    /// `IngestionInProgress` while another holder, in this process or
    /// another one sharing the store, has the same name locked.
    async fn lock_document(&self, document_name: &str) -> Result<DocumentLock>;

    /// Delete every row of a document, returning how many were removed.
    async fn delete_document(&self, document_name: &str) -> Result<usize>;

    /// Distinct document names in lexicographic order.
    async fn list_documents(&self) -> Result<Vec<String>>;

    /// Row count, for one document or the whole store.
    async fn count(&self, document_name: Option<&str>) -> Result<usize>;

    /// Nearest rows to `query` among the named documents.
    ///
    /// Results are sorted by non-decreasing distance, ties in insertion
    /// order, and hold at most `top_k` rows.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` when `document_names` is empty or `query` has the
    /// wrong dimensionality.
    async fn search(
        &self,
        query: &[f32],
        document_names: &[String],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>>;
}

// ============================================================================
// In-Memory Vector Store
// ============================================================================

use parking_lot::{Mutex, RwLock};

/// Exact-search store keeping rows in insertion order.
pub struct InMemoryVectorStore {
    schema: StoreSchema,
    rows: RwLock<Vec<StoredRow>>,
    locked: Arc<Mutex<HashSet<String>>>,
}

struct StoredRow {
    document_name: String,
    page_number: u32,
    content: String,
    embedding: Vec<f32>,
}

impl InMemoryVectorStore {
    pub fn new(schema: StoreSchema) -> Self {
        Self {
            schema,
            rows: RwLock::new(Vec::new()),
            locked: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn to_stored(&self, document_name: &str, rows: &[ChunkRow]) -> Result<Vec<StoredRow>> {
        rows.iter()
            .map(|row| {
                self.schema.check_vector(&row.embedding)?;
                Ok(StoredRow {
                    document_name: document_name.to_string(),
                    page_number: row.page_number,
                    content: row.content.clone(),
                    embedding: row.embedding.clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn provider_name(&self) -> &'static str {
        "in-memory"
    }

    fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    async fn insert(&self, document_name: &str, rows: &[ChunkRow]) -> Result<usize> {
        let stored = self.to_stored(document_name, rows)?;
        let written = stored.len();
        self.rows.write().extend(stored);
        Ok(written)
    }

    async fn replace_document(&self, document_name: &str, rows: &[ChunkRow]) -> Result<usize> {
        let stored = self.to_stored(document_name, rows)?;
        let written = stored.len();

        let mut guard = self.rows.write();
        guard.retain(|row| row.document_name != document_name);
        guard.extend(stored);
        Ok(written)
    }

    async fn lock_document(&self, document_name: &str) -> Result<DocumentLock> {
        if !self.locked.lock().insert(document_name.to_string()) {
            return Err(AppError::IngestionInProgress(document_name.to_string()));
        }

        let locked = Arc::clone(&self.locked);
        let name = document_name.to_string();
        Ok(DocumentLock::new(document_name, move || {
            locked.lock().remove(&name);
        }))
    }

    async fn delete_document(&self, document_name: &str) -> Result<usize> {
        let mut guard = self.rows.write();
        let before = guard.len();
        guard.retain(|row| row.document_name != document_name);
        Ok(before - guard.len())
    }

    async fn list_documents(&self) -> Result<Vec<String>> {
        let guard = self.rows.read();
        let mut names: Vec<String> = guard
            .iter()
            .map(|row| row.document_name.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn count(&self, document_name: Option<&str>) -> Result<usize> {
        let guard = self.rows.read();
        Ok(match document_name {
            Some(name) => guard.iter().filter(|row| row.document_name == name).count(),
            None => guard.len(),
        })
    }

    async fn search(
        &self,
        query: &[f32],
        document_names: &[String],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let scope: HashSet<String> = search_scope(&self.schema, query, document_names)?
            .into_iter()
            .collect();
        let metric = self.schema.metric;

        let guard = self.rows.read();
        let mut scored: Vec<(f32, &StoredRow)> = guard
            .iter()
            .filter(|row| scope.contains(&row.document_name))
            .map(|row| (metric.distance(query, &row.embedding), row))
            .collect();

        // sort_by is stable, so equal distances keep insertion order
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(distance, row)| RetrievedChunk {
                document_name: row.document_name.clone(),
                page_number: row.page_number,
                content: row.content.clone(),
                distance,
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
