//! Core data models used throughout the pipeline.
//!
//! [`SourceDocument`] and [`Chunk`] exist only while an index is being built;
//! the vector store keeps the chunk text as payload, and query-time results
//! come back as [`ScoredChunk`]s inside a [`RetrievalResult`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One page (or other logical unit) of extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub page_index: usize,
    pub source_path: String,
}

/// A loaded document: its path plus ordered text segments.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub segments: Vec<Segment>,
}

/// A window of segment text, the unit that gets embedded and retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_path: String,
    pub page_index: usize,
    /// Position of this chunk within its document (contiguous from 0).
    pub chunk_index: usize,
    /// Character offset of the chunk's first character within its segment.
    pub start: usize,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk paired with its embedding vector, as written to a collection.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Top-k chunks for a query, ordered by descending score.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// The chunks in rank order.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.hits.iter().map(|h| h.chunk.clone()).collect()
    }
}

/// Final answer plus the chunks that were given to the model as context.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub supporting_chunks: Vec<Chunk>,
}
