
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

use super::session::{ChatMessage, ConversationSession, MemoryPolicy};
use crate::database::{RetrievedChunk, VectorStore};
use crate::embeddings::EmbeddingProvider;
use crate::llm::{ChainConfig, LanguageModel, ModelFactory, Prompt};
use crate::{RagError, Result};

/// Chunks retrieved per question unless configured otherwise
pub const DEFAULT_K: usize = 5;

const INSTRUCTIONS: &str = "You are a helpful assistant that answers questions about the user's documents. \
Use only the numbered context passages below. If the answer is not in the context, say that you \
don't know. Mention the source file when you rely on a passage.";

/// Answer to one question, with the context it was grounded on
#[derive(Debug, Clone, PartialEq)]
pub struct ChainResponse {
    pub answer: String,
    /// Distinct sources in retrieval order
    pub sources: Vec<String>,
    /// Retrieved passages, closest first
    pub chunks: Vec<RetrievedChunk>,
}

pub enum ChainState {
    Uninitialized,
    Ready {
        config: ChainConfig,
        model: Arc<dyn LanguageModel>,
    },
}

impl std::fmt::Debug for ChainState {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("Uninitialized"),
            Self::Ready { config, model } => f
                .debug_struct("Ready")
                .field("config", config)
                .field("model", &model.name())
                .finish(),
        }
    }
}

/// Retrieval-augmented question answering over the vector store
pub struct RagChain {
    state: ChainState,
    factory: Arc<dyn ModelFactory>,
    store: VectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    k: usize,
}

impl RagChain {
    #[inline]
    pub fn new(
        factory: Arc<dyn ModelFactory>,
        store: VectorStore,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            state: ChainState::Uninitialized,
            factory,
            store,
            embedder,
            k: DEFAULT_K,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    #[inline]
    pub fn state(&self) -> &ChainState {
        &self.state
    }

    /// The configuration the chain is currently bound to
    #[inline]
    pub fn config(&self) -> Option<&ChainConfig> {
        match &self.state {
            ChainState::Uninitialized => None,
            ChainState::Ready { config, .. } => Some(config),
        }
    }

    /// Bind the chain to `config`, building a new model when it changed.
    ///
    /// Returns whether a rebuild happened. A failed build leaves the chain in
    /// its previous state.
    #[inline]
    pub fn configure(
        &mut self,
        config: ChainConfig,
        session: &mut ConversationSession,
    ) -> Result<bool> {
        if self.config() == Some(&config) {
            return Ok(false);
        }

        let model = self.factory.build(&config)?;
        info!(
            "Chain configured with {} (temperature {})",
            model.name(),
            config.temperature
        );
        self.state = ChainState::Ready { config, model };

        if session.policy() == MemoryPolicy::ResetOnRebuild && !session.is_empty() {
            debug!("Clearing {} messages after chain rebuild", session.len());
            session.clear();
        }
        Ok(true)
    }

    /// Answer `query` from the retrieved context and the session history
    #[inline]
    pub async fn invoke(
        &self,
        query: &str,
        session: &mut ConversationSession,
    ) -> Result<ChainResponse> {
        let ChainState::Ready { model, .. } = &self.state else {
            return Err(RagError::Generation {
                sources: Vec::new(),
                source: Box::new(RagError::Config("chain not configured".to_string())),
            });
        };

        let chunks = self
            .store
            .similarity_search(query, self.k, self.embedder.as_ref())
            .await?;
        let sources = distinct_sources(&chunks);
        debug!("Retrieved {} chunks from {} sources", chunks.len(), sources.len());

        let prompt = build_prompt(&chunks, session.history(), query);
        let answer = match model.complete(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                return Err(RagError::Generation {
                    sources,
                    source: Box::new(e),
                });
            }
        };

        session.push_user(query);
        session.push_assistant(answer.as_str());

        Ok(ChainResponse {
            answer,
            sources,
            chunks,
        })
    }
}

fn distinct_sources(chunks: &[RetrievedChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for chunk in chunks {
        if !sources.contains(&chunk.source) {
            sources.push(chunk.source.clone());
        }
    }
    sources
}

fn build_prompt(chunks: &[RetrievedChunk], history: &[ChatMessage], query: &str) -> Prompt {
    let mut system = String::from(INSTRUCTIONS);
    system.push_str("\n\nContext:\n");
    if chunks.is_empty() {
        system.push_str("(no relevant passages were found)\n");
    }
    for (i, chunk) in chunks.iter().enumerate() {
        let _ = write!(
            system,
            "\n[{}] (source: {})\n{}\n",
            i + 1,
            chunk.source,
            chunk.content.trim()
        );
    }

    let mut messages = history.to_vec();
    messages.push(ChatMessage::user(query));

    Prompt { system, messages }
}
