use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Unsupported document format: {0} (expected a .pdf or .txt file)")]
    UnsupportedFormat(String),

    #[error("Failed to load document {name}: {message}")]
    Load { name: String, message: String },

    #[error("Authentication failed for {provider}: {message}")]
    Auth { provider: String, message: String },

    #[error("Rate limit exceeded for {provider}: {message}")]
    RateLimit { provider: String, message: String },

    #[error("Answer generation failed: {source}")]
    Generation {
        /// Sources that were retrieved before the model call failed
        sources: Vec<String>,
        #[source]
        source: Box<RagError>,
    },

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Embedding mismatch: {0}. Reset the store before switching embedding providers")]
    EmbeddingMismatch(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Sources that were retrieved for a query whose answer could not be generated
    #[inline]
    pub fn retrieved_sources(&self) -> &[String] {
        match self {
            Self::Generation { sources, .. } => sources,
            _ => &[],
        }
    }
}

pub mod chat;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod http;
pub mod ingest;
pub mod llm;

#[cfg(test)]
mod testing;
