// Database module
// LanceDB holds the document vectors, SQLite holds query analytics

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::{
    ChunkMetadata, EmbeddingRecord, PEEK_LIMIT, RetrievedChunk, StoreStats, StoredChunk,
    VectorStore,
};
pub use self::sqlite::AnalyticsStore;
pub use self::sqlite::models::{AnalyticsSummary, QueryRecord, SourceUsage};
