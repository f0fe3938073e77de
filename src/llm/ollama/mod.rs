
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{ChainConfig, LanguageModel, Prompt};
use crate::config::Config;
use crate::http::{HttpClient, run_blocking};
use crate::{RagError, Result};

/// Chat completions from Ollama's `/api/chat`
#[derive(Debug, Clone)]
pub struct OllamaChat {
    name: String,
    url: Url,
    model: String,
    temperature: f32,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaChat {
    #[inline]
    pub fn new(config: &Config, chain: &ChainConfig) -> Result<Self> {
        let url = config
            .ollama_url()
            .ok()
            .and_then(|base| base.join("/api/chat").ok())
            .ok_or_else(|| RagError::Config("Invalid Ollama URL".to_string()))?;

        Ok(Self {
            name: format!("ollama/{}", chain.model),
            url,
            model: chain.model.clone(),
            temperature: chain.temperature,
            http: HttpClient::from_config("Ollama", &config.network),
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    fn complete_blocking(&self, prompt: &Prompt) -> Result<String> {
        let mut messages = Vec::with_capacity(prompt.messages.len() + 1);
        messages.push(Message {
            role: "system",
            content: &prompt.system,
        });
        messages.extend(prompt.messages.iter().map(|message| Message {
            role: message.role.as_str(),
            content: &message.content,
        }));

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: Options {
                temperature: self.temperature,
            },
        };

        let response_text = self.http.post_json(self.url.as_str(), &request, &[])?;
        let response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Model(format!("Failed to parse Ollama response: {}", e)))?;

        if response.message.content.trim().is_empty() {
            return Err(RagError::Model("Ollama returned an empty answer".to_string()));
        }

        Ok(response.message.content)
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
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
