// Embedding providers: text in, fixed-dimension vectors out

pub mod gemini;
pub mod ollama;


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::{RagError, Result};

pub use gemini::GeminiEmbedder;
pub use ollama::{ModelInfo, OllamaEmbedder};

/// Maps text to embedding vectors.
///
/// Implementations return exactly one vector per input, in input order, and
/// every vector from one provider has the same dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier stored next to every vector, e.g. `ollama/nomic-embed-text:latest`
    fn model_id(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string
    #[inline]
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[query.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("provider returned no vector for the query".into()))
    }
}

/// Which embedding provider is configured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama on the local machine
    #[default]
    Local,
    Gemini,
}

impl fmt::Display for EmbeddingBackend {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// Build the embedding provider selected in the configuration
#[inline]
pub fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.embeddings.provider {
        EmbeddingBackend::Local => Arc::new(OllamaEmbedder::new(config)?),
        EmbeddingBackend::Gemini => Arc::new(GeminiEmbedder::new(config)?),
    };
    info!("Using embedding model {}", embedder.model_id());
    Ok(embedder)
}

/// Check a provider response: one vector per input, all of the same non-zero dimension
pub(crate) fn check_embeddings(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(RagError::Embedding(format!(
            "Mismatch between request and response counts: {} vs {}",
            expected,
            vectors.len()
        )));
    }

    if let Some(first) = vectors.first() {
        if first.is_empty() {
            return Err(RagError::Embedding("provider returned an empty vector".into()));
        }
        if let Some(other) = vectors.iter().find(|v| v.len() != first.len()) {
            return Err(RagError::Embedding(format!(
                "inconsistent vector dimensions: {} and {}",
                first.len(),
                other.len()
            )));
        }
    }

    Ok(())
}
