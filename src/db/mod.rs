//! Chunk storage.
//!
//! - `pgvector` (default) - PostgreSQL with the pgvector extension
//! - in-memory - exact search over a process-local table, for tests and
//!   one-off sessions
//!
//! Disable the PostgreSQL backend with `--no-default-features`.

// Vector store abstraction layer
pub mod vectorstore;

#[cfg(feature = "pgvector")]
pub mod pgvector;

// Re-exports
pub use vectorstore::{
    DistanceMetric, DocumentLock, InMemoryVectorStore, StoreSchema, VectorStore,
    VectorStoreProvider, SCHEMA_VERSION,
};

#[cfg(feature = "pgvector")]
pub use pgvector::PgVectorStore;
