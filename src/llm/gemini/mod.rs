#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChainConfig, LanguageModel, Prompt};
use crate::chat::session::Role;
use crate::config::Config;
use crate::http::{HttpClient, run_blocking};
use crate::{RagError, Result};

pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";

/// `{base}/v1beta/models/{model}:{method}`
pub(crate) fn model_endpoint(base_url: &str, model: &str, method: &str) -> String {
    format!(
        "{}/v1beta/models/{}:{}",
        base_url.trim_end_matches('/'),
        model,
        method
    )
}

/// The configured Gemini API key, or an authentication error when none is set
pub(crate) fn require_api_key(config: &Config) -> Result<String> {
    config
        .gemini
        .api_key()
        .map(str::to_string)
        .ok_or_else(|| RagError::Auth {
            provider: "Gemini".to_string(),
            message: "Google API key not found. Set GOOGLE_API_KEY or run `docs-rag config`"
                .to_string(),
        })
}

/// Chat completions from the Gemini `generateContent` endpoint
#[derive(Debug, Clone)]
pub struct GeminiChat {
    name: String,
    endpoint: String,
    api_key: String,
    temperature: f32,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiChat {
    /// Fails with an authentication error when no API key is configured
    #[inline]
    pub fn new(config: &Config, chain: &ChainConfig) -> Result<Self> {
        let api_key = require_api_key(config)?;

        Ok(Self {
            name: format!("gemini/{}", chain.model),
            endpoint: model_endpoint(&config.gemini.base_url, &chain.model, "generateContent"),
            api_key,
            temperature: chain.temperature,
            http: HttpClient::from_config("Gemini", &config.network),
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    fn complete_blocking(&self, prompt: &Prompt) -> Result<String> {
        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: &prompt.system,
                }],
            },
            contents: prompt
                .messages
                .iter()
                .map(|message| Content {
                    role: Some(match message.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    }),
                    parts: [Part {
                        text: &message.content,
                    }],
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        let response_text = self.http.post_json(
            &self.endpoint,
            &request,
            &[(API_KEY_HEADER, self.api_key.as_str())],
        )?;
        let response: GenerateResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Model(format!("Failed to parse Gemini response: {}", e)))?;

        extract_answer(response)
    }
}

fn extract_answer(response: GenerateResponse) -> Result<String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        warn!("Gemini returned no answer: {}", reason);
        return Err(RagError::Model(format!("Gemini returned no answer: {}", reason)));
    };

    let text: String = candidate
        .content
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(RagError::Model(format!(
            "Gemini returned an empty answer (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[async_trait]
impl LanguageModel for GeminiChat {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        debug!(
            "Sending {} messages to {}",
            prompt.messages.len(),
            self.name
        );
        let client = self.clone();
        let prompt = prompt.clone();
        run_blocking(move || client.complete_blocking(&prompt)).await
    }
}
