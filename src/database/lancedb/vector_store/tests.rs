use super::*;
use crate::testing::{FailingEmbedder, KeywordEmbedder};
use tempfile::TempDir;

const DIM: usize = 32;

async fn create_test_store() -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    let store = VectorStore::new(&config)
        .await
        .expect("should create vector store");
    (store, temp_dir)
}

fn records_for(embedder: &KeywordEmbedder, source: &str, texts: &[&str]) -> Vec<EmbeddingRecord> {
    texts
        .iter()
        .zip(0_u32..)
        .map(|(text, chunk_index)| EmbeddingRecord {
            vector: embedder.vector_for(text),
            metadata: ChunkMetadata::new(source, *text, chunk_index, embedder.model_id()),
        })
        .collect()
}

#[tokio::test]
async fn vector_store_initialization() {
    let (store, temp_dir) = create_test_store().await;
    assert_eq!(store.path(), temp_dir.path().join("vectors"));

    let stats = store.stats().await.expect("stats on a fresh store");
    assert_eq!(stats, StoreStats::default());
}

#[tokio::test]
async fn add_assigns_unique_ids() {
    let (store, _temp_dir) = create_test_store().await;
    let embedder = KeywordEmbedder::new(DIM);

    let records = records_for(&embedder, "notes.txt", &["same text", "same text"]);
    let stored = store.add(records).await.expect("should store records");
    assert_eq!(stored, 2);

    let stats = store.stats().await.expect("should read stats");
    assert_eq!(stats.count, 2);
    assert_eq!(stats.sample.len(), 2);
    assert_ne!(stats.sample[0].id, stats.sample[1].id);
    assert!(uuid::Uuid::parse_str(&stats.sample[0].id).is_ok());
}

#[tokio::test]
async fn empty_add_is_a_no_op() {
    let (store, _temp_dir) = create_test_store().await;
    assert_eq!(store.add(Vec::new()).await.expect("empty add succeeds"), 0);
    assert_eq!(store.stats().await.expect("stats").count, 0);
}

#[tokio::test]
async fn search_returns_nearest_first() {
    let (store, _temp_dir) = create_test_store().await;
    let embedder = KeywordEmbedder::new(DIM);

    store
        .add(records_for(
            &embedder,
            "geo.txt",
            &[
                "Paris is the capital of France",
                "Berlin is the capital of Germany",
                "Bananas are rich in potassium",
            ],
        ))
        .await
        .expect("should store records");

    let results = store
        .similarity_search("capital of France Paris", 2, &embedder)
        .await
        .expect("search should succeed");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].content, "Paris is the capital of France");
    assert_eq!(results[0].source, "geo.txt");
    assert!(results[0].distance <= results[1].distance);
    assert!((results[0].score - (1.0 - results[0].distance)).abs() < f32::EPSILON);
}

#[tokio::test]
async fn search_returns_at_most_k() {
    let (store, _temp_dir) = create_test_store().await;
    let embedder = KeywordEmbedder::new(DIM);

    let texts: Vec<String> = (0..8).map(|i| format!("document number {}", i)).collect();
    let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    store
        .add(records_for(&embedder, "many.txt", &text_refs))
        .await
        .expect("should store records");

    for k in [1, 3, 8, 20] {
        let results = store
            .similarity_search("document", k, &embedder)
            .await
            .expect("search should succeed");
        assert_eq!(results.len(), k.min(8));
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    }
}

#[tokio::test]
async fn empty_store_search_skips_embedding() {
    let (store, _temp_dir) = create_test_store().await;

    let results = store
        .similarity_search("anything", 5, &FailingEmbedder)
        .await
        .expect("missing table yields no results");
    assert!(results.is_empty());

    let embedder = KeywordEmbedder::new(DIM);
    store
        .add(records_for(&embedder, "a.txt", &["content"]))
        .await
        .expect("should store records");
    let results = store
        .similarity_search("content", 0, &FailingEmbedder)
        .await
        .expect("k = 0 yields no results");
    assert!(results.is_empty());
}

#[tokio::test]
async fn stats_are_idempotent() {
    let (store, _temp_dir) = create_test_store().await;
    let embedder = KeywordEmbedder::new(DIM);

    let texts: Vec<String> = (0..15).map(|i| format!("row {}", i)).collect();
    let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    store
        .add(records_for(&embedder, "rows.txt", &text_refs))
        .await
        .expect("should store records");

    let first = store.stats().await.expect("stats");
    let second = store.stats().await.expect("stats");
    assert_eq!(first.count, 15);
    assert_eq!(first.sample.len(), PEEK_LIMIT);
    assert_eq!(first, second);
}

#[tokio::test]
async fn reset_empties_the_store() {
    let (store, _temp_dir) = create_test_store().await;
    let embedder = KeywordEmbedder::new(DIM);

    store
        .add(records_for(&embedder, "a.txt", &["alpha", "beta"]))
        .await
        .expect("should store records");
    store.reset().await.expect("reset should succeed");

    assert_eq!(store.stats().await.expect("stats").count, 0);
    assert!(
        store
            .similarity_search("alpha", 5, &embedder)
            .await
            .expect("search after reset")
            .is_empty()
    );

    // Resetting twice is fine
    store.reset().await.expect("second reset should succeed");
}

#[tokio::test]
async fn mismatched_dimension_is_rejected() {
    let (store, _temp_dir) = create_test_store().await;
    let small = KeywordEmbedder::new(DIM);
    let large = KeywordEmbedder::new(DIM * 2);

    store
        .add(records_for(&small, "a.txt", &["alpha"]))
        .await
        .expect("should store records");

    let err = store
        .add(records_for(&large, "b.txt", &["beta"]))
        .await
        .expect_err("dimension change must be rejected");
    assert!(matches!(err, RagError::EmbeddingMismatch(_)), "got {:?}", err);

    let err = store
        .similarity_search("alpha", 3, &large)
        .await
        .expect_err("query dimension change must be rejected");
    assert!(matches!(err, RagError::EmbeddingMismatch(_)), "got {:?}", err);

    store.reset().await.expect("reset should succeed");
    store
        .add(records_for(&large, "b.txt", &["beta"]))
        .await
        .expect("new dimension is accepted after reset");
}

#[tokio::test]
async fn mismatched_model_is_rejected() {
    let (store, _temp_dir) = create_test_store().await;
    let local = KeywordEmbedder::named(DIM, "ollama/o'model");
    let remote = KeywordEmbedder::named(DIM, "gemini/other");

    store
        .add(records_for(&local, "a.txt", &["alpha"]))
        .await
        .expect("should store records");
    store
        .add(records_for(&local, "a.txt", &["alpha again"]))
        .await
        .expect("same model may keep writing");

    let err = store
        .add(records_for(&remote, "b.txt", &["beta"]))
        .await
        .expect_err("model change must be rejected");
    assert!(matches!(err, RagError::EmbeddingMismatch(_)), "got {:?}", err);
    assert_eq!(store.stats().await.expect("stats").count, 2);
}

#[tokio::test]
async fn clones_share_the_table() {
    let (store, _temp_dir) = create_test_store().await;
    let embedder = KeywordEmbedder::new(DIM);
    let other = store.clone();

    let writer = tokio::spawn({
        let store = store.clone();
        let records = records_for(&embedder, "a.txt", &["alpha", "beta", "gamma"]);
        async move { store.add(records).await }
    });
    writer
        .await
        .expect("task should join")
        .expect("write should succeed");

    let stats = other.stats().await.expect("stats");
    assert_eq!(stats.count, 3);
}

#[tokio::test]
async fn reopening_keeps_documents() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectors");
    let embedder = KeywordEmbedder::new(DIM);

    {
        let store = VectorStore::open(&path).await.expect("open store");
        store
            .add(records_for(&embedder, "kept.txt", &["persistent chunk"]))
            .await
            .expect("should store records");
    }

    let store = VectorStore::open(&path).await.expect("reopen store");
    let stats = store.stats().await.expect("stats");
    assert_eq!(stats.count, 1);
    assert_eq!(stats.sample[0].metadata.source, "kept.txt");
}

#[tokio::test]
async fn search_with_another_model_is_rejected() {
    let (store, _temp_dir) = create_test_store().await;
    let local = KeywordEmbedder::named(DIM, "ollama/nomic-embed-text");
    let remote = KeywordEmbedder::named(DIM, "gemini/text-embedding-004");

    store
        .add(records_for(&local, "a.txt", &["alpha"]))
        .await
        .expect("should store records");

    let err = store
        .similarity_search("alpha", 3, &remote)
        .await
        .expect_err("vectors from another model are not comparable");
    assert!(matches!(err, RagError::EmbeddingMismatch(_)), "got {:?}", err);
    assert_eq!(remote.calls(), 0);

    let results = store
        .similarity_search("alpha", 3, &local)
        .await
        .expect("the storing model can still search");
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn first_write_creates_the_table_with_its_rows() {
    let (store, _temp_dir) = create_test_store().await;
    let embedder = KeywordEmbedder::new(DIM);
    assert!(store.table_names().await.expect("list tables").is_empty());

    store
        .add(records_for(&embedder, "a.txt", &["alpha", "beta"]))
        .await
        .expect("should store records");

    assert_eq!(
        store.table_names().await.expect("list tables"),
        vec![TABLE_NAME.to_string()]
    );
    assert_eq!(store.stats().await.expect("stats").count, 2);
}

#[tokio::test]
async fn rejected_first_write_leaves_no_table() {
    let (store, _temp_dir) = create_test_store().await;
    let wide = KeywordEmbedder::new(DIM);
    let narrow = KeywordEmbedder::new(DIM / 2);

    let mut records = records_for(&wide, "a.txt", &["alpha"]);
    records.extend(records_for(&narrow, "b.txt", &["beta"]));
    store
        .add(records)
        .await
        .expect_err("mixed dimensions must be rejected");
    assert!(store.table_names().await.expect("list tables").is_empty());

    // Nothing was pinned, so any dimension may start the store
    store
        .add(records_for(&narrow, "b.txt", &["beta"]))
        .await
        .expect("a fresh store accepts the first valid batch");
    assert_eq!(store.stats().await.expect("stats").count, 1);
}

#[tokio::test]
async fn blocked_path_is_unavailable() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let blocker = temp_dir.path().join("vectors");
    std::fs::write(&blocker, "not a directory").expect("should write file");

    let err = VectorStore::open(&blocker)
        .await
        .err()
        .expect("a regular file cannot hold the store");
    assert!(matches!(err, RagError::StoreUnavailable(_)), "got {:?}", err);
    assert_eq!(
        std::fs::read_to_string(&blocker).expect("file is untouched"),
        "not a directory"
    );
}
