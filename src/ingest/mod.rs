// Ingestion pipeline: load, split, embed, store

pub mod chunking;
pub mod loader;


use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::database::{ChunkMetadata, EmbeddingRecord, VectorStore};
use crate::embeddings::EmbeddingProvider;
use crate::{RagError, Result};

pub use chunking::{ChunkingConfig, TextChunk, TextSplitter};
pub use loader::{Document, DocumentKind, MAX_DOCUMENT_BYTES, load_text};

/// Result of ingesting one file
#[derive(Debug)]
pub struct IngestOutcome {
    pub name: String,
    /// Number of chunks stored, or why the file was skipped
    pub result: Result<usize>,
}

/// Per-file results of a batch ingestion
#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<IngestOutcome>,
}

impl IngestReport {
    #[inline]
    pub fn push(&mut self, name: impl Into<String>, result: Result<usize>) {
        self.outcomes.push(IngestOutcome {
            name: name.into(),
            result,
        });
    }

    /// Chunks stored across all successful files
    #[inline]
    pub fn total_chunks(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .sum()
    }

    #[inline]
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, usize)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|n| (o.name.as_str(), *n)))
    }

    #[inline]
    pub fn failed(&self) -> impl Iterator<Item = (&str, &RagError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.name.as_str(), e)))
    }

    #[inline]
    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}

/// Turns documents into stored, embedded chunks
#[derive(Clone)]
pub struct Ingestor {
    store: VectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    splitter: TextSplitter,
}

impl Ingestor {
    #[inline]
    pub fn new(
        store: VectorStore,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: &ChunkingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            splitter: TextSplitter::new(chunking),
        }
    }

    /// Ingest one document, returning the number of chunks stored.
    ///
    /// All chunks of the document are written at once, so a failure stores
    /// nothing.
    #[inline]
    pub async fn ingest(&self, document: &Document) -> Result<usize> {
        let kind = document.kind()?;
        debug!("Ingesting {} ({}, {} bytes)", document.name, kind, document.bytes.len());

        let text = load_text(document).await?;
        let chunks = self.splitter.chunk(&text);
        if chunks.is_empty() {
            return Err(RagError::Load {
                name: document.name.clone(),
                message: "no extractable text".to_string(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings for {}, got {}",
                chunks.len(),
                document.name,
                vectors.len()
            )));
        }

        let model_id = self.embedder.model_id();
        let records = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let chunk_index = u32::try_from(chunk.chunk_index).map_err(|_| RagError::Load {
                    name: document.name.clone(),
                    message: "too many chunks".to_string(),
                })?;
                Ok(EmbeddingRecord {
                    vector,
                    metadata: ChunkMetadata::new(
                        document.name.as_str(),
                        chunk.content,
                        chunk_index,
                        model_id,
                    ),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let stored = self.store.add(records).await?;
        info!("Ingested {} as {} chunks", document.name, stored);
        Ok(stored)
    }

    /// Ingest documents one after another; a failing file never stops the rest
    #[inline]
    pub async fn ingest_batch(&self, documents: Vec<Document>) -> IngestReport {
        self.ingest_batch_with(documents, |_| {}).await
    }

    /// Like [`Self::ingest_batch`], calling `on_file` after each document
    #[inline]
    pub async fn ingest_batch_with<F>(&self, documents: Vec<Document>, mut on_file: F) -> IngestReport
    where
        F: FnMut(&IngestOutcome) + Send,
    {
        let mut report = IngestReport::default();

        for document in documents {
            let result = self.ingest(&document).await;
            if let Err(e) = &result {
                warn!("Failed to ingest {}: {}", document.name, e);
            }
            report.push(document.name, result);
            if let Some(outcome) = report.outcomes.last() {
                on_file(outcome);
            }
        }

        info!(
            "Batch ingestion stored {} chunks from {} files",
            report.total_chunks(),
            report.outcomes.len()
        );
        report
    }

    /// Read a file from disk and ingest it under its file name
    #[inline]
    pub async fn ingest_path<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let document = read_document(path).await?;
        self.ingest(&document).await
    }
}

/// Read a file into a [`Document`] named after its file name
#[inline]
pub async fn read_document<P: AsRef<Path>>(path: P) -> Result<Document> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RagError::Load {
            name: path.display().to_string(),
            message: "path has no file name".to_string(),
        })?
        .to_string();

    DocumentKind::from_name(&name)?;

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_DOCUMENT_BYTES as u64 {
        return Err(RagError::Load {
            name,
            message: format!("file is larger than the {} byte limit", MAX_DOCUMENT_BYTES),
        });
    }

    let bytes = tokio::fs::read(path).await?;
    Ok(Document::new(name, bytes))
}
