#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end pipeline tests with in-process embedding and chat stand-ins

use async_trait::async_trait;
use docs_rag::chat::{ConversationSession, MemoryPolicy, RagChain};
use docs_rag::database::{AnalyticsStore, VectorStore};
use docs_rag::embeddings::EmbeddingProvider;
use docs_rag::ingest::{ChunkingConfig, Document, Ingestor, TextSplitter};
use docs_rag::llm::{ChainConfig, LanguageModel, ModelFactory, Prompt, Provider};
use docs_rag::{RagError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const DIM: usize = 64;

/// Letter-frequency embedder: deterministic and good enough to rank overlapping text
struct LetterEmbedder;

impl LetterEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; DIM];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 3) {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7_usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % DIM;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-6);
        vector.iter_mut().for_each(|v| *v /= norm);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_id(&self) -> &str {
        "test/letters"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Echoes the temperature it was built with, so tests can see which model answered
struct EchoModel {
    temperature: f32,
    prompts: Mutex<Vec<Prompt>>,
}

#[async_trait]
impl LanguageModel for EchoModel {
    fn name(&self) -> &str {
        "test/echo"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.prompts.lock().expect("lock").push(prompt.clone());
        Ok(format!("answered at temperature {:.1}", self.temperature))
    }
}

#[derive(Default)]
struct EchoFactory {
    builds: Mutex<Vec<ChainConfig>>,
}

impl ModelFactory for EchoFactory {
    fn build(&self, config: &ChainConfig) -> Result<Arc<dyn LanguageModel>> {
        self.builds.lock().expect("lock").push(config.clone());
        Ok(Arc::new(EchoModel {
            temperature: config.temperature,
            prompts: Mutex::new(Vec::new()),
        }))
    }
}

struct Harness {
    store: VectorStore,
    ingestor: Ingestor,
    _temp_dir: TempDir,
}

async fn harness() -> Harness {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(temp_dir.path().join("vectors"))
        .await
        .expect("should open store");
    let ingestor = Ingestor::new(
        store.clone(),
        Arc::new(LetterEmbedder),
        &ChunkingConfig::default(),
    );
    Harness {
        store,
        ingestor,
        _temp_dir: temp_dir,
    }
}

fn chain_config(temperature: f32) -> ChainConfig {
    ChainConfig {
        provider: Provider::Ollama,
        model: "llama3".to_string(),
        temperature,
    }
}

fn prose(seed: &str, len: usize) -> String {
    seed.chars().cycle().take(len).collect()
}

#[tokio::test]
async fn long_text_file_is_split_with_overlap() {
    let h = harness().await;
    let text = prose("Tidal energy converts the motion of the ocean into power. ", 2500);

    let stored = h
        .ingestor
        .ingest(&Document::new("tides.txt", text.as_str()))
        .await
        .expect("ingest should succeed");
    assert_eq!(stored, 3);

    let chunks = TextSplitter::new(&ChunkingConfig::default()).split(&text);
    assert_eq!(chunks.len(), 3);
    for pair in chunks.windows(2) {
        let tail: String = pair[0].chars().skip(pair[0].chars().count() - 200).collect();
        let head: String = pair[1].chars().take(200).collect();
        assert_eq!(tail, head, "adjacent chunks share 200 characters");
    }
}

#[tokio::test]
async fn search_results_only_cite_ingested_files() {
    let h = harness().await;
    let report = h
        .ingestor
        .ingest_batch(vec![
            Document::new("a.txt", prose("Volcanoes erupt molten rock called lava. ", 1800)),
            Document::new("b.txt", prose("Glaciers carve valleys over centuries. ", 1800)),
        ])
        .await;
    assert!(!report.has_failures());

    let allowed: HashSet<&str> = ["a.txt", "b.txt"].into_iter().collect();
    for query in ["lava", "glacier valleys", "completely unrelated words"] {
        let results = h
            .store
            .similarity_search(query, 5, &LetterEmbedder)
            .await
            .expect("search should succeed");
        assert!(results.len() <= 5);
        assert!(results.iter().all(|r| allowed.contains(r.source.as_str())));
    }

    let results = h
        .store
        .similarity_search("volcanoes erupt molten lava", 1, &LetterEmbedder)
        .await
        .expect("search should succeed");
    assert_eq!(results[0].source, "a.txt");
}

#[tokio::test]
async fn every_stored_chunk_keeps_provenance() {
    let h = harness().await;
    h.ingestor
        .ingest(&Document::new("Report 2024.TXT", prose("Revenue grew in every region. ", 3100)))
        .await
        .expect("ingest should succeed");

    let stats = h.store.stats().await.expect("stats");
    assert_eq!(stats.count, 4);
    for chunk in &stats.sample {
        assert_eq!(chunk.metadata.source, "Report 2024.TXT");
        assert_eq!(chunk.metadata.embedding_model, "test/letters");
        assert!(chunk.metadata.chunk_index < 4);
        assert!(!chunk.metadata.content.is_empty());
    }
}

#[tokio::test]
async fn reset_then_stats_reports_empty() {
    let h = harness().await;
    h.ingestor
        .ingest(&Document::new("a.txt", "Something worth remembering."))
        .await
        .expect("ingest should succeed");

    h.store.reset().await.expect("reset should succeed");
    let stats = h.store.stats().await.expect("stats");
    assert_eq!(stats.count, 0);
    assert!(stats.sample.is_empty());

    // The store accepts new documents after a reset
    h.ingestor
        .ingest(&Document::new("b.txt", "A fresh start."))
        .await
        .expect("ingest after reset");
    assert_eq!(h.store.stats().await.expect("stats").count, 1);
}

#[tokio::test]
async fn empty_store_still_answers() {
    let h = harness().await;
    let mut chain = RagChain::new(
        Arc::new(EchoFactory::default()),
        h.store.clone(),
        Arc::new(LetterEmbedder),
    );
    let mut session = ConversationSession::default();

    chain
        .configure(chain_config(0.7), &mut session)
        .expect("configure");
    let response = chain
        .invoke("irrelevant gibberish query", &mut session)
        .await
        .expect("empty store is not an error");
    assert!(response.sources.is_empty());
    assert!(!response.answer.is_empty());
}

#[tokio::test]
async fn temperature_change_applies_to_the_next_question() {
    let h = harness().await;
    h.ingestor
        .ingest(&Document::new("notes.txt", "The meeting moved to Thursday."))
        .await
        .expect("ingest should succeed");

    let factory = Arc::new(EchoFactory::default());
    let mut chain = RagChain::new(
        Arc::clone(&factory) as Arc<dyn ModelFactory>,
        h.store.clone(),
        Arc::new(LetterEmbedder),
    );
    let mut session = ConversationSession::new(MemoryPolicy::Persist);

    chain.configure(chain_config(0.7), &mut session).expect("configure");
    let first = chain
        .invoke("When is the meeting?", &mut session)
        .await
        .expect("invoke");
    assert_eq!(first.answer, "answered at temperature 0.7");
    assert_eq!(first.sources, vec!["notes.txt".to_string()]);

    let rebuilt = chain.configure(chain_config(0.2), &mut session).expect("configure");
    assert!(rebuilt);
    let second = chain
        .invoke("And which day again?", &mut session)
        .await
        .expect("invoke");
    assert_eq!(second.answer, "answered at temperature 0.2");
    assert_eq!(session.len(), 4);
    assert_eq!(factory.builds.lock().expect("lock").len(), 2);
}

#[tokio::test]
async fn answered_questions_can_be_logged() {
    let h = harness().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let analytics = AnalyticsStore::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("should open analytics");
    h.ingestor
        .ingest(&Document::new("faq.txt", "Returns are accepted within thirty days."))
        .await
        .expect("ingest should succeed");

    let mut chain = RagChain::new(
        Arc::new(EchoFactory::default()),
        h.store.clone(),
        Arc::new(LetterEmbedder),
    );
    let mut session = ConversationSession::default();
    chain.configure(chain_config(0.5), &mut session).expect("configure");
    let response = chain
        .invoke("What is the returns policy?", &mut session)
        .await
        .expect("invoke");

    analytics
        .log_query("What is the returns policy?", Duration::from_millis(42), &response.sources)
        .await
        .expect("should log query");

    let summary = analytics.summary().await.expect("summary");
    assert_eq!(summary.total_queries, 1);
    assert_eq!(summary.top_sources[0].source, "faq.txt");
    let recent = analytics.recent(5).await.expect("recent");
    assert_eq!(recent[0].sources, vec!["faq.txt".to_string()]);
}

#[tokio::test]
async fn unsupported_file_in_batch_does_not_block_others() {
    let h = harness().await;
    let report = h
        .ingestor
        .ingest_batch(vec![
            Document::new("deck.pptx", "not supported"),
            Document::new("ok.txt", "Supported content here."),
        ])
        .await;

    let failures: Vec<_> = report.failed().collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0].1, RagError::UnsupportedFormat(_)));
    assert_eq!(report.total_chunks(), 1);
}
