// Language models that turn an assembled prompt into an answer

pub mod gemini;
pub mod ollama;


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::Result;
use crate::chat::session::ChatMessage;
use crate::config::Config;

pub use gemini::GeminiChat;
pub use ollama::OllamaChat;

/// Language model provider
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    Ollama,
}

impl fmt::Display for Provider {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => write!(f, "Gemini"),
            Self::Ollama => write!(f, "Ollama"),
        }
    }
}

/// The parameters a chain is bound to; changing any of them rebuilds the model
#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    pub provider: Provider,
    pub model: String,
    pub temperature: f32,
}

/// A fully assembled request for a chat model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Instructions plus the retrieved context
    pub system: String,
    /// Prior turns followed by the current question
    pub messages: Vec<ChatMessage>,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Human-readable `provider/model` label
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

/// Builds language models for chain configurations
pub trait ModelFactory: Send + Sync {
    fn build(&self, config: &ChainConfig) -> Result<Arc<dyn LanguageModel>>;
}

/// Factory backed by the application configuration
#[derive(Debug, Clone)]
pub struct ConfigModelFactory {
    config: Config,
}

impl ConfigModelFactory {
    #[inline]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ModelFactory for ConfigModelFactory {
    #[inline]
    fn build(&self, chain: &ChainConfig) -> Result<Arc<dyn LanguageModel>> {
        let model: Arc<dyn LanguageModel> = match chain.provider {
            Provider::Gemini => Arc::new(GeminiChat::new(&self.config, chain)?),
            Provider::Ollama => Arc::new(OllamaChat::new(&self.config, chain)?),
        };
        info!(
            "Built language model {} (temperature {})",
            model.name(),
            chain.temperature
        );
        Ok(model)
    }
}
