//! In-memory [`VectorStore`] implementation for tests and small corpora.
//!
//! Collections live in a `HashMap` behind a `tokio::sync::RwLock`. Vector
//! search is brute-force cosine similarity over every stored vector.
//!
//! A collection is bound to the embedder of its first upsert; vectors from
//! any other embedder are refused.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::{cosine_similarity, EmbedderIdentity};
use crate::error::ServiceError;
use crate::models::{IndexEntry, ScoredChunk};

use super::{rank, VectorStore};

struct StoredEntry {
    entry: IndexEntry,
    seq: usize,
}

struct Collection {
    dims: usize,
    embedder: Option<EmbedderIdentity>,
    entries: Vec<StoredEntry>,
}

/// In-memory store. Contents are lost when the store is dropped.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(collection: &str) -> ServiceError {
    ServiceError::Status {
        service: "memory".to_string(),
        status: 404,
        body: format!("collection '{}' not found", collection),
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, ServiceError> {
        Ok(self.collections.read().await.contains_key(collection))
    }

    async fn create_collection(&self, collection: &str, dims: usize) -> Result<(), ServiceError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(collection) {
            return Err(ServiceError::Status {
                service: "memory".to_string(),
                status: 409,
                body: format!("collection '{}' already exists", collection),
            });
        }
        collections.insert(
            collection.to_string(),
            Collection {
                dims,
                embedder: None,
                entries: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), ServiceError> {
        self.collections.write().await.remove(collection);
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        entries: &[IndexEntry],
        first_seq: usize,
        embedder: &EmbedderIdentity,
    ) -> Result<(), ServiceError> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        if let Some(bound) = stored.embedder.as_ref().filter(|bound| *bound != embedder) {
            return Err(ServiceError::Status {
                service: "memory".to_string(),
                status: 409,
                body: format!(
                    "collection '{}' holds vectors from {}, refusing {}",
                    collection, bound, embedder
                ),
            });
        }

        if let Some(bad) = entries.iter().find(|e| e.vector.len() != stored.dims) {
            return Err(ServiceError::Status {
                service: "memory".to_string(),
                status: 400,
                body: format!(
                    "vector has {} dimensions, collection expects {}",
                    bad.vector.len(),
                    stored.dims
                ),
            });
        }

        for (offset, entry) in entries.iter().enumerate() {
            stored.entries.push(StoredEntry {
                entry: entry.clone(),
                seq: first_seq + offset,
            });
        }
        stored.embedder.get_or_insert_with(|| embedder.clone());
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError> {
        let collections = self.collections.read().await;
        let stored = collections
            .get(collection)
            .ok_or_else(|| missing(collection))?;

        let hits = stored
            .entries
            .iter()
            .map(|se| {
                let score = cosine_similarity(query_vec, &se.entry.vector);
                (
                    ScoredChunk {
                        chunk: se.entry.chunk.clone(),
                        score,
                    },
                    se.seq,
                )
            })
            .collect();
        Ok(rank(hits, limit))
    }

    async fn count(&self, collection: &str) -> Result<usize, ServiceError> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.entries.len())
            .ok_or_else(|| missing(collection))
    }
}
