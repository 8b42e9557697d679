//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait covers the operations the index builder and
//! retriever need from a vector database: collection lifecycle, bulk insert,
//! and nearest-neighbor search. Two backends ship with the crate:
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | in-process | [`memory`] | tests, `backend = "memory"` |
//! | Qdrant (gRPC) | [`qdrant`] | `backend = "qdrant"` |
//!
//! Implementations make a single attempt per call; timeouts and retries are
//! applied by the callers through [`crate::retry`].

pub mod memory;
pub mod qdrant;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::VectorStoreConfig;
use crate::embedding::EmbedderIdentity;
use crate::error::ServiceError;
use crate::models::{IndexEntry, ScoredChunk};

/// Abstract vector database backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`collection_exists`](VectorStore::collection_exists) | Check for a named collection |
/// | [`create_collection`](VectorStore::create_collection) | Create an empty cosine-distance collection |
/// | [`delete_collection`](VectorStore::delete_collection) | Drop a collection and its entries |
/// | [`upsert`](VectorStore::upsert) | Append entries tagged with the embedder identity |
/// | [`search`](VectorStore::search) | Top-`limit` entries by cosine similarity |
/// | [`count`](VectorStore::count) | Number of stored entries |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name used in logs and error messages.
    fn backend_name(&self) -> &str;

    async fn collection_exists(&self, collection: &str) -> Result<bool, ServiceError>;

    async fn create_collection(&self, collection: &str, dims: usize) -> Result<(), ServiceError>;

    async fn delete_collection(&self, collection: &str) -> Result<(), ServiceError>;

    /// Store entries. `first_seq` is the insertion sequence number of
    /// `entries[0]`; search uses it to break score ties.
    async fn upsert(
        &self,
        collection: &str,
        entries: &[IndexEntry],
        first_seq: usize,
        embedder: &EmbedderIdentity,
    ) -> Result<(), ServiceError>;

    /// Return at most `limit` entries ordered by descending similarity, ties
    /// in insertion order.
    async fn search(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError>;

    async fn count(&self, collection: &str) -> Result<usize, ServiceError>;
}

/// Create the backend selected by `config.backend`.
pub fn create_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(memory::InMemoryStore::new())),
        "qdrant" => Ok(Arc::new(qdrant::QdrantStore::new(config)?)),
        other => anyhow::bail!("Unknown vector store backend: {}", other),
    }
}

/// Order hits by descending score, breaking ties by ascending sequence number.
pub(crate) fn rank(mut hits: Vec<(ScoredChunk, usize)>, limit: usize) -> Vec<ScoredChunk> {
    hits.sort_by(|(a, seq_a), (b, seq_b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(seq_a.cmp(seq_b))
    });
    hits.truncate(limit);
    hits.into_iter().map(|(hit, _)| hit).collect()
}
