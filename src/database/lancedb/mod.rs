// LanceDB vector database module
// Stores document chunks with their embeddings for similarity search


pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::{PEEK_LIMIT, RetrievedChunk, StoreStats, StoredChunk, VectorStore};

/// A chunk and its embedding, ready to be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Metadata stored alongside each embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// File name of the document the chunk came from
    pub source: String,
    /// The actual text content of the chunk
    pub content: String,
    /// Index of this chunk within its document
    pub chunk_index: u32,
    /// Identifier of the embedding model that produced the vector
    pub embedding_model: String,
    /// RFC 3339 timestamp of ingestion
    pub created_at: String,
}

impl ChunkMetadata {
    #[inline]
    pub fn new(
        source: impl Into<String>,
        content: impl Into<String>,
        chunk_index: u32,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            chunk_index,
            embedding_model: embedding_model.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
