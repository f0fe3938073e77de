
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EmbeddingProvider, check_embeddings};
use crate::config::Config;
use crate::http::{HttpClient, run_blocking};
use crate::llm::gemini::{API_KEY_HEADER, model_endpoint, require_api_key};
use crate::{RagError, Result};

/// Embeddings from the Gemini `batchEmbedContents` endpoint
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    endpoint: String,
    model: String,
    model_id: String,
    api_key: String,
    batch_size: u32,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    /// Fails with an authentication error when no API key is configured
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = require_api_key(config)?;
        let model = config.gemini.embedding_model.clone();

        Ok(Self {
            endpoint: model_endpoint(&config.gemini.base_url, &model, "batchEmbedContents"),
            model_id: format!("gemini/{}", model),
            model: format!("models/{}", model),
            api_key,
            batch_size: config.gemini.batch_size.max(1),
            http: HttpClient::from_config("Gemini", &config.network),
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size as usize) {
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| EmbedContentRequest {
                        model: &self.model,
                        content: Content {
                            parts: [Part { text }],
                        },
                    })
                    .collect(),
            };

            let response_text = self.http.post_json(
                &self.endpoint,
                &request,
                &[(API_KEY_HEADER, self.api_key.as_str())],
            )?;
            let response: BatchEmbedResponse =
                serde_json::from_str(&response_text).map_err(|e| {
                    RagError::Embedding(format!("Failed to parse Gemini embedding response: {}", e))
                })?;

            let vectors: Vec<Vec<f32>> = response.embeddings.into_iter().map(|e| e.values).collect();
            check_embeddings(batch.len(), &vectors)?;
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating Gemini embeddings for {} texts", texts.len());
        let client = self.clone();
        let texts = texts.to_vec();

        let embeddings = run_blocking(move || client.embed_blocking(&texts)).await?;
        check_embeddings(embeddings.len(), &embeddings)?;
        Ok(embeddings)
    }
}
