
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for splitting documents into chunks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// A chunk of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    /// Position of this chunk within its document
    pub chunk_index: usize,
}

/// Sliding-window character splitter.
///
/// Windows are `chunk_size` characters wide and advance by
/// `chunk_size - chunk_overlap`. The last window always ends at the end of
/// the text, so every chunk after the first starts with exactly
/// `chunk_overlap` characters of its predecessor.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    step: usize,
}

impl TextSplitter {
    /// Build a splitter; an overlap that is not smaller than the size is
    /// clamped so the window always advances
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        let overlap = config.chunk_overlap.min(chunk_size - 1);
        Self {
            chunk_size,
            step: chunk_size - overlap,
        }
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn overlap(&self) -> usize {
        self.chunk_size - self.step
    }

    #[inline]
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, including the end of the text
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;

        let mut chunks = Vec::with_capacity(char_count / self.step + 1);
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(char_count);
            if let Some(chunk) = text.get(boundaries[start]..boundaries[end]) {
                chunks.push(chunk.to_string());
            }
            if end == char_count {
                break;
            }
            start += self.step;
        }

        debug!(
            "Split {} characters into {} chunks (size {}, overlap {})",
            char_count,
            chunks.len(),
            self.chunk_size,
            self.overlap()
        );

        chunks
    }

    /// Split and number the chunks
    #[inline]
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        self.split(text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| TextChunk {
                content,
                chunk_index,
            })
            .collect()
    }
}

/// Split text with the given configuration
#[inline]
pub fn split(text: &str, config: &ChunkingConfig) -> Vec<String> {
    TextSplitter::new(config).split(text)
}
