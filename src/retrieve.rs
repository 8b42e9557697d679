//! Query-time retrieval.
//!
//! The [`Retriever`] embeds a query with the same embedder that built the
//! collection and returns the top-k nearest chunks. Both the query embedding
//! and the search are idempotent and go through bounded retries.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result, ServiceError};
use crate::index::VectorIndex;
use crate::models::RetrievalResult;
use crate::retry::{with_retries, RetryPolicy};

pub struct Retriever {
    index: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    embed_policy: RetryPolicy,
    search_policy: RetryPolicy,
}

impl Retriever {
    /// Pair an index with the query-time embedder.
    ///
    /// Fails with [`RagError::EmbeddingMismatch`] if `embedder` is not the
    /// one the index was built with.
    pub fn new(
        index: VectorIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        embed_policy: RetryPolicy,
        search_policy: RetryPolicy,
    ) -> Result<Self> {
        let query = embedder.identity();
        if &query != index.embedder() {
            return Err(RagError::EmbeddingMismatch {
                collection: index.collection().to_string(),
                indexed: index.embedder().to_string(),
                query: query.to_string(),
            });
        }
        Ok(Self {
            index,
            embedder,
            embed_policy,
            search_policy,
        })
    }

    /// Top `k` chunks for `query_text`, best first.
    pub async fn retrieve(&self, query_text: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidConfig("top_k must be >= 1".to_string()));
        }
        let collection = self.index.collection();
        let retrieval_err = |source| RagError::Retrieval {
            collection: collection.to_string(),
            source,
        };

        let embedder = self.embedder.as_ref();
        let texts = [query_text.to_string()];
        let vector = with_retries("embedding", &self.embed_policy, || embedder.embed(&texts))
            .await
            .and_then(|mut vectors| {
                vectors
                    .pop()
                    .ok_or_else(|| ServiceError::invalid("embedding", "no vector for query"))
            })
            .map_err(retrieval_err)?;

        let index = &self.index;
        let hits = with_retries("search", &self.search_policy, || index.search(&vector, k))
            .await
            .map_err(retrieval_err)?;

        debug!(collection, k, hits = hits.len(), "retrieved");
        Ok(RetrievalResult { hits })
    }
}
