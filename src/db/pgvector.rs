//! PostgreSQL pgvector integration.
//!
//! Chunks live in a single table (default `document_chunks_paginated`):
//!
//! ```sql
//! CREATE TABLE document_chunks_paginated (
//!     id            BIGSERIAL PRIMARY KEY,
//!     document_name TEXT NOT NULL,
//!     page_number   INTEGER NOT NULL CHECK (page_number >= 1),
//!     content       TEXT NOT NULL,
//!     embedding     vector(1536) NOT NULL
//! );
//! ```
//!
//! The metric and dimensionality are recorded in `folio_schema` when the
//! table is first created and checked on every later connect. Searches order
//! by the recorded metric's operator, then by `id`, so equal distances come
//! back in insertion order.
//!
//! # Feature Flag
//!
//! Enabled by default through the `pgvector` feature.

use crate::db::vectorstore::{
    search_scope, DistanceMetric, DocumentLock, StoreSchema, VectorStore,
};
use crate::types::{AppError, ChunkRow, Result, RetrievedChunk};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA_TABLE: &str = "folio_schema";

/// First key of the two-key advisory lock held while a document is ingested.
/// Two-key locks never collide with the single-key locks taken by writes.
const INGEST_LOCK_CLASS: i32 = 0x464F_4C49;

/// Columns every chunk table needs, besides `id` and `embedding`.
const REQUIRED_COLUMNS: [&str; 3] = ["document_name", "page_number", "content"];

/// Parse a connection URL and apply a separately supplied password.
///
/// The password is passed as-is, so it may contain characters that would
/// need escaping inside a URL.
pub fn connect_options(
    connection_string: &str,
    password: Option<&str>,
) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(connection_string)
        .map_err(|e| AppError::Configuration(format!("invalid database URL: {}", e)))?;
    Ok(match password {
        Some(password) => options.password(password),
        None => options,
    })
}

/// How an existing chunk table relates to the layout folio expects.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TableLayout {
    /// No table yet.
    Missing,
    /// Matches, including the `id` tie-break column.
    Ready,
    /// Matches apart from a missing `id` column, which can be added in place.
    NeedsId,
}

/// Compare `(column, type)` pairs of an existing table with the expected layout.
///
/// Returns a description of what was found when the table cannot be used.
fn inspect_layout(
    columns: &[(String, String)],
    dimensions: usize,
) -> std::result::Result<TableLayout, String> {
    if columns.is_empty() {
        return Ok(TableLayout::Missing);
    }

    let type_of = |name: &str| {
        columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, data_type)| data_type.as_str())
    };

    if let Some(missing) = REQUIRED_COLUMNS.iter().find(|c| type_of(c).is_none()) {
        return Err(format!("existing table without a '{}' column", missing));
    }

    let expected = format!("vector({})", dimensions);
    match type_of("embedding") {
        Some(found) if found == expected => {}
        Some(found) => return Err(format!("existing table with embedding {}", found)),
        None => return Err("existing table without an 'embedding' column".to_string()),
    }

    Ok(match type_of("id") {
        Some(_) => TableLayout::Ready,
        None => TableLayout::NeedsId,
    })
}

/// Chunk store backed by PostgreSQL with the pgvector extension.
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
    schema: StoreSchema,
}

impl PgVectorStore {
    /// Connect, create the tables if needed and check the recorded schema.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` when the database cannot be reached within
    /// `connect_timeout`, `SchemaMismatch` when the table was created with a
    /// different metric, dimensionality or layout version.
    pub async fn connect(
        connection_string: &str,
        table: &str,
        schema: StoreSchema,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let options = connect_options(connection_string, None)?;
        Self::connect_with(options, table, schema, max_connections, connect_timeout).await
    }

    /// Same as [`connect`](Self::connect) with pre-built connection options.
    pub async fn connect_with(
        options: PgConnectOptions,
        table: &str,
        schema: StoreSchema,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let table = sanitize_table_name(table)?;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        let store = Self {
            pool,
            table,
            schema,
        };
        store.prepare().await?;
        Ok(store)
    }

    /// Wrap an existing pool. The schema is checked the same way as `connect`.
    pub async fn from_pool(pool: PgPool, table: &str, schema: StoreSchema) -> Result<Self> {
        let store = Self {
            pool,
            table: sanitize_table_name(table)?,
            schema,
        };
        store.prepare().await?;
        Ok(store)
    }

    async fn prepare(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(map_err)?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {SCHEMA_TABLE} (\
                table_name TEXT PRIMARY KEY, \
                version INTEGER NOT NULL, \
                metric TEXT NOT NULL, \
                dimensions INTEGER NOT NULL, \
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()\
            )"
        ))
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        let recorded = sqlx::query(&format!(
            "SELECT version, metric, dimensions FROM {SCHEMA_TABLE} WHERE table_name = $1"
        ))
        .bind(&self.table)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        match recorded {
            Some(row) => {
                let version: i32 = row.try_get("version").map_err(map_err)?;
                let metric: String = row.try_get("metric").map_err(map_err)?;
                let dimensions: i32 = row.try_get("dimensions").map_err(map_err)?;

                let found = StoreSchema {
                    version: version as u32,
                    metric: metric.parse::<DistanceMetric>().map_err(|e| {
                        AppError::SchemaMismatch {
                            expected: self.schema.to_string(),
                            found: e,
                        }
                    })?,
                    dimensions: dimensions as usize,
                };
                found.validate_against(&self.schema)?;
                debug!(table = %self.table, schema = %found, "pgvector schema verified");
            }
            None => {
                let columns = self.existing_columns().await?;
                let layout = inspect_layout(&columns, self.schema.dimensions).map_err(|found| {
                    AppError::SchemaMismatch {
                        expected: self.schema.to_string(),
                        found,
                    }
                })?;

                if layout == TableLayout::NeedsId {
                    sqlx::query(&format!(
                        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS id BIGSERIAL",
                        self.table
                    ))
                    .execute(&self.pool)
                    .await
                    .map_err(map_err)?;
                    warn!(table = %self.table, "added id column to existing chunk table");
                }

                self.create_chunk_table().await?;
                info!(
                    table = %self.table,
                    schema = %self.schema,
                    existing = layout != TableLayout::Missing,
                    "recorded pgvector chunk table schema"
                );
            }
        }

        Ok(())
    }

    /// `(column, type)` pairs of the chunk table, empty when it does not exist.
    async fn existing_columns(&self) -> Result<Vec<(String, String)>> {
        sqlx::query_as(
            "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod) \
             FROM pg_attribute a \
             WHERE a.attrelid = to_regclass($1) AND a.attnum > 0 AND NOT a.attisdropped",
        )
        .bind(&self.table)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn create_chunk_table(&self) -> Result<()> {
        let table = &self.table;
        let dimensions = self.schema.dimensions;

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                id BIGSERIAL PRIMARY KEY, \
                document_name TEXT NOT NULL, \
                page_number INTEGER NOT NULL CHECK (page_number >= 1), \
                content TEXT NOT NULL, \
                embedding vector({dimensions}) NOT NULL\
            )"
        ))
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_document_name_idx ON {table} (document_name)"
        ))
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        sqlx::query(&format!(
            "INSERT INTO {SCHEMA_TABLE} (table_name, version, metric, dimensions) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (table_name) DO NOTHING"
        ))
        .bind(table)
        .bind(self.schema.version as i32)
        .bind(self.schema.metric.name())
        .bind(dimensions as i32)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        tx.commit().await.map_err(map_err)
    }

    /// Take the per-document advisory lock for the rest of the transaction.
    async fn lock_for_write(tx: &mut Transaction<'_, Postgres>, document_name: &str) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(document_name)
            .execute(&mut **tx)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn insert_rows(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        document_name: &str,
        rows: &[ChunkRow],
    ) -> Result<usize> {
        let sql = format!(
            "INSERT INTO {} (document_name, page_number, content, embedding) \
             VALUES ($1, $2, $3, $4::vector)",
            self.table
        );

        for row in rows {
            sqlx::query(&sql)
                .bind(document_name)
                .bind(row.page_number as i32)
                .bind(&row.content)
                .bind(vector_literal(&row.embedding))
                .execute(&mut **tx)
                .await
                .map_err(map_err)?;
        }

        Ok(rows.len())
    }

    fn check_rows(&self, rows: &[ChunkRow]) -> Result<()> {
        rows.iter()
            .try_for_each(|row| self.schema.check_vector(&row.embedding))
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn provider_name(&self) -> &'static str {
        "pgvector"
    }

    fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    async fn insert(&self, document_name: &str, rows: &[ChunkRow]) -> Result<usize> {
        self.check_rows(rows)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(map_err)?;
        Self::lock_for_write(&mut tx, document_name).await?;
        let written = self.insert_rows(&mut tx, document_name, rows).await?;
        tx.commit().await.map_err(map_err)?;

        debug!(document = document_name, chunks = written, "inserted chunks into pgvector");
        Ok(written)
    }

    async fn replace_document(&self, document_name: &str, rows: &[ChunkRow]) -> Result<usize> {
        self.check_rows(rows)?;

        let mut tx = self.pool.begin().await.map_err(map_err)?;
        Self::lock_for_write(&mut tx, document_name).await?;

        let deleted = sqlx::query(&format!(
            "DELETE FROM {} WHERE document_name = $1",
            self.table
        ))
        .bind(document_name)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?
        .rows_affected();

        let written = self.insert_rows(&mut tx, document_name, rows).await?;
        tx.commit().await.map_err(map_err)?;

        debug!(
            document = document_name,
            deleted,
            chunks = written,
            "replaced document chunks in pgvector"
        );
        Ok(written)
    }

    async fn lock_document(&self, document_name: &str) -> Result<DocumentLock> {
        // Session-level lock on a connection taken out of the pool, so it
        // lives until the guard closes that connection.
        let mut conn = self.pool.acquire().await.map_err(map_err)?.detach();

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1, hashtext($2))")
            .bind(INGEST_LOCK_CLASS)
            .bind(document_name)
            .fetch_one(&mut conn)
            .await
            .map_err(map_err)?;

        if !acquired {
            return Err(AppError::IngestionInProgress(document_name.to_string()));
        }

        let name = document_name.to_string();
        Ok(DocumentLock::new(document_name, move || {
            // Without a runtime the connection is dropped, which ends the
            // session and releases the lock server-side.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let unlocked = sqlx::query("SELECT pg_advisory_unlock($1, hashtext($2))")
                        .bind(INGEST_LOCK_CLASS)
                        .bind(&name)
                        .execute(&mut conn)
                        .await;
                    if let Err(e) = unlocked {
                        debug!(document = %name, error = %e, "advisory unlock failed");
                    }
                    let _ = conn.close().await;
                });
            }
        }))
    }

    async fn delete_document(&self, document_name: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        Self::lock_for_write(&mut tx, document_name).await?;

        let deleted = sqlx::query(&format!(
            "DELETE FROM {} WHERE document_name = $1",
            self.table
        ))
        .bind(document_name)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?
        .rows_affected();

        tx.commit().await.map_err(map_err)?;
        Ok(deleted as usize)
    }

    async fn list_documents(&self) -> Result<Vec<String>> {
        // Sorted in Rust so the order is byte-wise regardless of the database collation
        let mut names: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT DISTINCT document_name FROM {}",
            self.table
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        names.sort();
        Ok(names)
    }

    async fn count(&self, document_name: Option<&str>) -> Result<usize> {
        let count: i64 = match document_name {
            Some(name) => sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM {} WHERE document_name = $1",
                self.table
            ))
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?,
            None => sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
                .fetch_one(&self.pool)
                .await
                .map_err(map_err)?,
        };
        Ok(count as usize)
    }

    async fn search(
        &self,
        query: &[f32],
        document_names: &[String],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let scope = search_scope(&self.schema, query, document_names)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let op = self.schema.metric.operator();
        let sql = format!(
            "SELECT document_name, page_number, content, \
                    (embedding {op} $1::vector)::float8 AS distance \
             FROM {} \
             WHERE document_name = ANY($2) \
             ORDER BY embedding {op} $1::vector, id \
             LIMIT $3",
            self.table
        );

        let rows = sqlx::query(&sql)
            .bind(vector_literal(query))
            .bind(&scope)
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;

        rows.iter()
            .map(|row| {
                let page_number: i32 = row.try_get("page_number").map_err(map_err)?;
                let distance: f64 = row.try_get("distance").map_err(map_err)?;
                Ok(RetrievedChunk {
                    document_name: row.try_get("document_name").map_err(map_err)?,
                    page_number: page_number as u32,
                    content: row.try_get("content").map_err(map_err)?,
                    distance: distance as f32,
                })
            })
            .collect()
    }
}

/// pgvector text input format: `[1,2,3]`.
fn vector_literal(values: &[f32]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn sanitize_table_name(name: &str) -> Result<String> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(AppError::Configuration(format!(
            "invalid table name '{}'",
            name
        )));
    }
    Ok(name.to_ascii_lowercase())
}

fn map_err(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => AppError::StoreUnavailable(err.to_string()),
        other => AppError::Database(other.to_string()),
    }
}
