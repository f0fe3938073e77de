
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::{EmbeddingProvider, check_embeddings};
use crate::config::Config;
use crate::http::{HttpClient, run_blocking};
use crate::{RagError, Result};

/// Embeddings from an Ollama server, by default the one on the local machine
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    base_url: Url,
    model: String,
    model_id: String,
    batch_size: u32,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaEmbedder {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| RagError::Config(format!("Invalid Ollama URL: {}", e)))?;

        Ok(Self {
            base_url,
            model: config.ollama.embedding_model.clone(),
            model_id: format!("ollama/{}", config.ollama.embedding_model),
            batch_size: config.ollama.batch_size.max(1),
            http: HttpClient::from_config("Ollama", &config.network),
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Test connection to the Ollama server and verify the embedding model is pulled
    #[inline]
    pub async fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().await?;
        let model = self.model.clone();

        if models.iter().any(|m| m.name == model) {
            info!(
                "Health check passed for Ollama server at {} with model {}",
                self.base_url, model
            );
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                model, available
            );
            Err(RagError::Embedding(format!(
                "Model '{}' is not available in Ollama. Available models: {:?}",
                model, available
            )))
        }
    }

    /// List all models the server has pulled
    #[inline]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;
        let http = self.http.clone();

        debug!("Fetching available models from {}", url);
        let response_text = run_blocking(move || http.get(url.as_str())).await?;

        let models: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Failed to parse models response: {}", e)))?;

        debug!("Found {} models", models.models.len());
        Ok(models.models)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Config(format!("Failed to build Ollama URL: {}", e)))
    }

    fn embed_blocking(&self, url: &Url, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size as usize) {
            let request = BatchEmbedRequest {
                model: &self.model,
                inputs: batch,
            };

            let response_text = self.http.post_json(url.as_str(), &request, &[])?;
            let response: BatchEmbedResponse =
                serde_json::from_str(&response_text).map_err(|e| {
                    RagError::Embedding(format!("Failed to parse embedding response: {}", e))
                })?;

            check_embeddings(batch.len(), &response.embeddings)?;
            embeddings.extend(response.embeddings);
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating Ollama embeddings for {} texts", texts.len());
        let url = self.endpoint("/api/embed")?;
        let client = self.clone();
        let texts = texts.to_vec();

        let embeddings = run_blocking(move || client.embed_blocking(&url, &texts)).await?;
        check_embeddings(embeddings.len(), &embeddings)?;

        debug!("Generated {} embeddings total", embeddings.len());
        Ok(embeddings)
    }
}
