use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::chat::{ChainResponse, ConversationSession, RagChain};
use crate::config::Config;
use crate::database::{AnalyticsStore, RetrievedChunk, VectorStore};
use crate::embeddings::{EmbeddingBackend, EmbeddingProvider, OllamaEmbedder, build_embedder};
use crate::ingest::{Ingestor, read_document};
use crate::llm::{ChainConfig, ConfigModelFactory, Provider};

/// Chat model overrides given on the command line
#[derive(Debug, Clone, Default)]
pub struct ModelOverrides {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

struct Pipeline {
    config: Config,
    store: VectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Pipeline {
    async fn open() -> Result<Self> {
        let config = Config::load_default().context("Failed to load configuration")?;
        let store = VectorStore::new(&config)
            .await
            .context("Failed to open vector store")?;
        let embedder = build_embedder(&config).context("Failed to set up embeddings")?;
        Ok(Self {
            config,
            store,
            embedder,
        })
    }

    fn chain(&self) -> RagChain {
        RagChain::new(
            Arc::new(ConfigModelFactory::new(self.config.clone())),
            self.store.clone(),
            Arc::clone(&self.embedder),
        )
        .with_k(self.config.retrieval.k)
    }
}

/// Ingest PDF and text files into the vector store
#[inline]
pub async fn ingest_files(paths: &[PathBuf]) -> Result<()> {
    let pipeline = Pipeline::open().await?;
    let ingestor = Ingestor::new(
        pipeline.store.clone(),
        Arc::clone(&pipeline.embedder),
        &pipeline.config.chunking,
    );

    let progress = ProgressBar::new(paths.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );

    let mut documents = Vec::with_capacity(paths.len());
    let mut unreadable = Vec::new();
    for path in paths {
        match read_document(path).await {
            Ok(document) => documents.push(document),
            Err(e) => {
                progress.inc(1);
                unreadable.push((path.display().to_string(), e));
            }
        }
    }

    let report = ingestor
        .ingest_batch_with(documents, |outcome| {
            progress.set_message(outcome.name.clone());
            progress.inc(1);
        })
        .await;
    progress.finish_and_clear();

    for (name, chunks) in report.succeeded() {
        println!(
            "{} {} ({} chunks)",
            style("✓").green(),
            name,
            style(chunks).cyan()
        );
    }
    for (name, e) in report.failed() {
        println!("{} {}: {}", style("✗").red(), name, e);
    }
    for (name, e) in &unreadable {
        println!("{} {}: {}", style("✗").red(), name, e);
    }

    println!();
    println!(
        "Stored {} chunks from {} of {} files",
        style(report.total_chunks()).bold(),
        report.succeeded().count(),
        paths.len()
    );

    if report.has_failures() || !unreadable.is_empty() {
        warn!("Some files could not be ingested");
    }
    check_ingest_outcome(report.succeeded().count(), paths.len())
}

/// Fails when files were given but none of them made it into the store
fn check_ingest_outcome(succeeded: usize, attempted: usize) -> Result<()> {
    if attempted > 0 && succeeded == 0 {
        anyhow::bail!("None of the {} files could be ingested", attempted);
    }
    Ok(())
}

/// Show the chunks closest to a query
#[inline]
pub async fn search(query: &str, k: Option<usize>) -> Result<()> {
    let pipeline = Pipeline::open().await?;
    let k = k.unwrap_or(pipeline.config.retrieval.k);

    let results = pipeline
        .store
        .similarity_search(query, k, pipeline.embedder.as_ref())
        .await?;

    if results.is_empty() {
        println!("No documents found. Ingest some files first.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. {} #{} {}",
            i + 1,
            style(&result.source).cyan().bold(),
            result.chunk_index,
            style(format!("(score {:.3})", result.score)).dim()
        );
        println!("   {}", preview(&result.content, 200));
        println!();
    }
    Ok(())
}

/// Show how many chunks are stored and a sample of them
#[inline]
pub async fn show_stats() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let store = VectorStore::new(&config)
        .await
        .context("Failed to open vector store")?;
    let stats = store.stats().await?;

    println!("{}", style("📊 Document Store").bold().cyan());
    println!("  Location: {}", store.path().display());
    println!("  Chunks: {}", style(stats.count).bold());
    print_embedding_status(&config).await;

    if stats.sample.is_empty() {
        return Ok(());
    }

    let models = stats
        .sample
        .iter()
        .map(|chunk| chunk.metadata.embedding_model.as_str())
        .unique()
        .join(", ");
    println!("  Embedding model: {}", models);
    println!();
    println!("{}", style("Sample:").bold().yellow());
    for chunk in &stats.sample {
        println!(
            "  {} #{} {}",
            style(&chunk.metadata.source).cyan(),
            chunk.metadata.chunk_index,
            style(preview(&chunk.metadata.content, 80)).dim()
        );
    }
    Ok(())
}

async fn print_embedding_status(config: &Config) {
    if config.embeddings.provider != EmbeddingBackend::Local {
        println!("  Embeddings: {}", style(config.embeddings.provider).cyan());
        return;
    }

    let status = match OllamaEmbedder::new(config) {
        Ok(embedder) => match embedder.health_check().await {
            Ok(()) => style(format!("✅ Ollama ready ({})", embedder.model())).green(),
            Err(e) => style(format!("⚠️  Ollama unavailable: {}", e)).yellow(),
        },
        Err(e) => style(format!("❌ {}", e)).red(),
    };
    println!("  Embeddings: {}", status);
}

/// Delete every stored chunk
#[inline]
pub async fn reset_store(skip_confirmation: bool) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    if !skip_confirmation
        && !Confirm::new()
            .with_prompt("Delete all ingested documents? This cannot be undone.")
            .default(false)
            .interact()?
    {
        println!("Reset cancelled.");
        return Ok(());
    }

    let store = VectorStore::new(&config)
        .await
        .context("Failed to open vector store")?;
    store.reset().await?;
    println!("{}", style("✓ Document store cleared").green());
    Ok(())
}

/// Answer a single question
#[inline]
pub async fn ask(question: &str, overrides: ModelOverrides) -> Result<()> {
    let pipeline = Pipeline::open().await?;
    let analytics = open_analytics(&pipeline.config).await;
    let mut chain = pipeline.chain();
    let mut session = ConversationSession::new(pipeline.config.chat.memory_policy);

    let chain_config = pipeline.config.chain_config(
        overrides.provider,
        overrides.model,
        overrides.temperature,
    )?;
    chain.configure(chain_config, &mut session)?;

    let started = Instant::now();
    match chain.invoke(question, &mut session).await {
        Ok(response) => {
            print_response(&response);
            record_query(analytics.as_ref(), question, started, &response).await;
            Ok(())
        }
        Err(e) => {
            print_retrieved_sources(&e);
            Err(e.into())
        }
    }
}

/// Interactive conversation over the ingested documents
#[inline]
pub async fn chat(overrides: ModelOverrides) -> Result<()> {
    let pipeline = Pipeline::open().await?;
    let analytics = open_analytics(&pipeline.config).await;
    let mut chain = pipeline.chain();
    let mut session = ConversationSession::new(pipeline.config.chat.memory_policy);

    let mut settings = ChatSettings::new(&pipeline.config, overrides);

    println!("{}", style("💬 Docs RAG chat").bold().cyan());
    println!(
        "{}",
        style("Commands: /provider <gemini|ollama>, /model <name>, /temperature <0-1>, /clear, /export <file>, /exit").dim()
    );
    println!();

    loop {
        if let Some(e) = apply_settings(&pipeline.config, &mut settings, &mut chain, &mut session)? {
            println!("{} {:#}", style("✗").red(), e);
            println!(
                "{}",
                style(format!(
                    "Still using {} {}",
                    settings.provider,
                    settings.model.as_deref().unwrap_or_default()
                ))
                .dim()
            );
        }

        let line: String = Input::new()
            .with_prompt(style("You").green().to_string())
            .allow_empty(true)
            .interact_text()?;

        let question = match interpret_line(&line, &mut settings) {
            ChatAction::Nothing | ChatAction::Reconfigure => continue,
            ChatAction::Exit => break,
            ChatAction::Clear => {
                session.clear();
                println!("{}", style("History cleared").dim());
                continue;
            }
            ChatAction::Export(path) => {
                match session.export_to(&path) {
                    Ok(()) => println!("Exported {} messages to {}", session.len(), path),
                    Err(e) => println!("{} {}", style("✗").red(), e),
                }
                continue;
            }
            ChatAction::Notice(message) => {
                println!("{}", message);
                continue;
            }
            ChatAction::Ask(question) => question,
        };

        let started = Instant::now();
        match chain.invoke(&question, &mut session).await {
            Ok(response) => {
                print_response(&response);
                record_query(analytics.as_ref(), &question, started, &response).await;
            }
            Err(e) => print_failure(&e),
        }
        println!();
    }

    Ok(())
}

/// Model choices the chat loop can change between questions
#[derive(Debug, Clone, PartialEq)]
struct ChatSettings {
    provider: Provider,
    model: Option<String>,
    temperature: f32,
}

impl ChatSettings {
    fn new(config: &Config, overrides: ModelOverrides) -> Self {
        Self {
            provider: overrides.provider.unwrap_or(config.llm.provider),
            model: overrides.model,
            temperature: overrides.temperature.unwrap_or(config.llm.temperature),
        }
    }

    fn restore(&mut self, chain: &ChainConfig) {
        self.provider = chain.provider;
        self.model = Some(chain.model.clone());
        self.temperature = chain.temperature;
    }
}

/// What a line typed into the chat asks for
#[derive(Debug, Clone, PartialEq)]
enum ChatAction {
    Nothing,
    Exit,
    Clear,
    Export(String),
    Reconfigure,
    Notice(String),
    Ask(String),
}

fn interpret_line(line: &str, settings: &mut ChatSettings) -> ChatAction {
    let line = line.trim();
    if line.is_empty() {
        return ChatAction::Nothing;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatAction::Ask(line.to_string());
    };

    let (name, argument) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, argument)| (name, argument.trim()));
    match name {
        "exit" | "quit" => ChatAction::Exit,
        "clear" => ChatAction::Clear,
        "export" if argument.is_empty() => ChatAction::Export("chat_history.json".to_string()),
        "export" => ChatAction::Export(argument.to_string()),
        "provider" => {
            let provider = match argument.to_lowercase().as_str() {
                "gemini" => Provider::Gemini,
                "ollama" => Provider::Ollama,
                other => return ChatAction::Notice(format!("Unknown provider: {}", other)),
            };
            settings.provider = provider;
            settings.model = None;
            ChatAction::Reconfigure
        }
        "model" if !argument.is_empty() => {
            settings.model = Some(argument.to_string());
            ChatAction::Reconfigure
        }
        "temperature" => match argument.parse::<f32>() {
            Ok(value) => {
                settings.temperature = value;
                ChatAction::Reconfigure
            }
            Err(_) => ChatAction::Notice("Temperature must be a number".to_string()),
        },
        _ => ChatAction::Notice(format!("Unknown command: /{}", name)),
    }
}

/// Point `chain` at `settings`.
///
/// When the new settings cannot be used, the chain keeps its current model,
/// `settings` are rolled back to it and the error is returned as `Ok(Some)`.
/// It is only fatal when there is no working model to fall back to.
fn apply_settings(
    config: &Config,
    settings: &mut ChatSettings,
    chain: &mut RagChain,
    session: &mut ConversationSession,
) -> Result<Option<anyhow::Error>> {
    let attempt = config
        .chain_config(
            Some(settings.provider),
            settings.model.clone(),
            Some(settings.temperature),
        )
        .map_err(anyhow::Error::from)
        .and_then(|chain_config| {
            chain
                .configure(chain_config, session)
                .map_err(anyhow::Error::from)
        });

    let Err(e) = attempt else {
        return Ok(None);
    };
    match chain.config() {
        Some(working) => {
            warn!("Keeping the previous chat model: {:#}", e);
            settings.restore(working);
            Ok(Some(e))
        }
        None => Err(e),
    }
}

/// Delete every logged question
#[inline]
pub async fn clear_analytics(skip_confirmation: bool) -> Result<()> {
    if !skip_confirmation
        && !Confirm::new()
            .with_prompt("Delete the query history?")
            .default(false)
            .interact()?
    {
        println!("Clear cancelled.");
        return Ok(());
    }

    let config = Config::load_default().context("Failed to load configuration")?;
    let analytics = AnalyticsStore::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to open analytics database")?;
    let removed = analytics.clear().await?;
    println!(
        "{}",
        style(format!("✓ Removed {} logged questions", removed)).green()
    );
    Ok(())
}

/// Summarize logged questions
#[inline]
pub async fn show_analytics(recent: u32) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let analytics = AnalyticsStore::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to open analytics database")?;

    let summary = analytics.summary().await?;
    println!("{}", style("📈 Query Analytics").bold().cyan());
    println!("  Questions answered: {}", style(summary.total_queries).bold());
    println!(
        "  Average response time: {:.0} ms",
        summary.avg_response_ms
    );

    if !summary.top_sources.is_empty() {
        println!();
        println!("{}", style("Most cited sources:").bold().yellow());
        for usage in &summary.top_sources {
            println!("  {}", usage);
        }
    }

    if recent > 0 {
        let records = analytics.recent(recent).await?;
        if !records.is_empty() {
            println!();
            println!("{}", style("Recent questions:").bold().yellow());
        }
        for record in records {
            println!(
                "  {} {} {}",
                style(record.created_date.format("%Y-%m-%d %H:%M")).dim(),
                record.question,
                style(format!("({} ms)", record.response_ms)).dim()
            );
            if !record.sources.is_empty() {
                println!("    sources: {}", record.sources.join(", "));
            }
        }
    }
    Ok(())
}

async fn open_analytics(config: &Config) -> Option<AnalyticsStore> {
    match AnalyticsStore::initialize_from_config_dir(config.get_base_dir()).await {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("Query analytics disabled: {:#}", e);
            None
        }
    }
}

async fn record_query(
    analytics: Option<&AnalyticsStore>,
    question: &str,
    started: Instant,
    response: &ChainResponse,
) {
    let Some(analytics) = analytics else {
        return;
    };
    match analytics
        .log_query(question, started.elapsed(), &response.sources)
        .await
    {
        Ok(record) => info!("Logged query {}", record.id),
        Err(e) => warn!("Failed to log query: {:#}", e),
    }
}

fn print_response(response: &ChainResponse) {
    println!();
    println!("{}", response.answer.trim());
    if !response.chunks.is_empty() {
        println!();
        println!("{}", style("Context:").bold().yellow());
        for line in context_lines(&response.chunks) {
            println!("{}", style(line).dim());
        }
    }
    if !response.sources.is_empty() {
        println!();
        println!(
            "{} {}",
            style("Sources:").bold().yellow(),
            response.sources.iter().join(", ")
        );
    }
}

fn print_failure(error: &crate::RagError) {
    println!("{} {}", style("✗").red(), error);
    print_retrieved_sources(error);
}

fn print_retrieved_sources(error: &crate::RagError) {
    let sources = error.retrieved_sources();
    if !sources.is_empty() {
        println!(
            "{} {}",
            style("Retrieved sources:").dim(),
            sources.iter().join(", ")
        );
    }
}

fn context_lines(chunks: &[RetrievedChunk]) -> Vec<String> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "  [{}] {} #{}: {}",
                i + 1,
                chunk.source,
                chunk.chunk_index,
                preview(&chunk.content, 300)
            )
        })
        .collect()
}

/// First `max_chars` characters on a single line
fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
