//! Index building.
//!
//! [`IndexBuilder::build`] embeds chunks in batches and writes them to a
//! freshly created collection, returning a [`VectorIndex`] handle that
//! records which embedder produced the vectors. The build is all-or-nothing:
//! any embedding or storage failure aborts it with
//! [`RagError::IndexBuild`], and a collection created by the failed build is
//! dropped again so the same name can be reused on the next attempt.
//!
//! If that drop fails too, or the build future is cancelled part way, the
//! collection stays behind. A [`BuildMarker`] remembers it from just before
//! creation until the build completes, and the next build sharing the marker
//! drops it before `on_existing` is applied.
//!
//! # Collection Reuse
//!
//! | `on_existing` | Behavior when the collection exists |
//! |---------------|-------------------------------------|
//! | `reject` (default) | fail with [`RagError::CollectionExists`] |
//! | `replace` | drop it, then build from scratch |

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, OnExisting};
use crate::embedding::{EmbedderIdentity, EmbeddingProvider};
use crate::error::{RagError, Result, ServiceError};
use crate::models::{Chunk, IndexEntry, ScoredChunk};
use crate::retry::{with_retries, with_timeout, RetryPolicy};
use crate::store::VectorStore;

/// Handle to a built collection.
///
/// Cheap to clone; all clones refer to the same backing store.
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    collection: String,
    embedder: EmbedderIdentity,
    entries: usize,
    build_id: String,
}

impl VectorIndex {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The embedder that produced every vector in the collection.
    pub fn embedder(&self) -> &EmbedderIdentity {
        &self.embedder
    }

    /// Number of entries written by the build.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// Nearest-neighbor search against the collection. Single attempt.
    pub async fn search(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> std::result::Result<Vec<ScoredChunk>, ServiceError> {
        self.store.search(&self.collection, query_vec, limit).await
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("backend", &self.store.backend_name())
            .field("collection", &self.collection)
            .field("embedder", &self.embedder)
            .field("entries", &self.entries)
            .field("build_id", &self.build_id)
            .finish()
    }
}

/// Name of a collection whose build has started but not completed.
///
/// Clones share the same slot.
#[derive(Clone, Default)]
pub struct BuildMarker(Arc<Mutex<Option<String>>>);

impl BuildMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The collection left by an unfinished build, if any.
    pub fn pending(&self) -> Option<String> {
        self.slot().clone()
    }

    fn set(&self, collection: &str) {
        *self.slot() = Some(collection.to_string());
    }

    fn clear(&self) {
        *self.slot() = None;
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for BuildMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BuildMarker").field(&self.pending()).finish()
    }
}

/// Embeds chunks and materializes them into a collection.
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    on_existing: OnExisting,
    embed_policy: RetryPolicy,
    store_policy: RetryPolicy,
    marker: BuildMarker,
}

impl IndexBuilder {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: &Config,
    ) -> Self {
        Self {
            embedder,
            store,
            batch_size: config.embedding.batch_size.max(1),
            on_existing: config.vector_store.on_existing,
            embed_policy: RetryPolicy::new(
                config.embedding.max_retries,
                config.embedding.timeout(),
            ),
            store_policy: RetryPolicy::new(
                config.vector_store.max_retries,
                config.vector_store.timeout(),
            ),
            marker: BuildMarker::new(),
        }
    }

    /// Share `marker` with earlier builds so their leftovers get dropped.
    pub fn with_marker(mut self, marker: BuildMarker) -> Self {
        self.marker = marker;
        self
    }

    /// Override the retry policies (tests use a millisecond base delay).
    pub fn with_retry_policies(mut self, embed: RetryPolicy, store: RetryPolicy) -> Self {
        self.embed_policy = embed;
        self.store_policy = store;
        self
    }

    /// Build `collection` from `chunks`.
    ///
    /// An empty chunk list yields an empty collection, which is not an error.
    pub async fn build(&self, chunks: &[Chunk], collection: &str) -> Result<VectorIndex> {
        let build_id = Uuid::new_v4().to_string();
        let identity = self.embedder.identity();
        let started = Instant::now();
        info!(
            collection,
            build_id = %build_id,
            embedder = %identity,
            backend = self.store.backend_name(),
            chunks = chunks.len(),
            "building index"
        );

        self.drop_unfinished().await?;
        self.prepare_collection(collection, identity.dims).await?;

        if let Err(e) = self.write_entries(chunks, collection, &identity).await {
            if self.discard(collection).await {
                self.marker.clear();
            }
            return Err(RagError::IndexBuild {
                collection: collection.to_string(),
                source: e,
            });
        }
        self.marker.clear();

        info!(
            collection,
            build_id = %build_id,
            entries = chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index ready"
        );

        Ok(VectorIndex {
            store: Arc::clone(&self.store),
            collection: collection.to_string(),
            embedder: identity,
            entries: chunks.len(),
            build_id,
        })
    }

    /// Drop the collection an earlier unfinished build left behind.
    async fn drop_unfinished(&self) -> Result<()> {
        let Some(stale) = self.marker.pending() else {
            return Ok(());
        };
        let build_err = |source| RagError::IndexBuild {
            collection: stale.clone(),
            source,
        };
        let store = self.store.as_ref();
        let service = store.backend_name();

        let exists = with_retries(service, &self.store_policy, || {
            store.collection_exists(&stale)
        })
        .await
        .map_err(build_err)?;
        if exists {
            warn!(collection = %stale, "dropping collection left by an unfinished build");
            with_retries(service, &self.store_policy, || {
                store.delete_collection(&stale)
            })
            .await
            .map_err(build_err)?;
        }
        self.marker.clear();
        Ok(())
    }

    async fn prepare_collection(&self, collection: &str, dims: usize) -> Result<()> {
        let build_err = |source| RagError::IndexBuild {
            collection: collection.to_string(),
            source,
        };
        let store = self.store.as_ref();
        let service = store.backend_name();

        let exists = with_retries(service, &self.store_policy, || {
            store.collection_exists(collection)
        })
        .await
        .map_err(build_err)?;

        if exists {
            match self.on_existing {
                OnExisting::Reject => {
                    return Err(RagError::CollectionExists {
                        collection: collection.to_string(),
                    })
                }
                OnExisting::Replace => {
                    info!(collection, "replacing existing collection");
                    with_timeout(
                        service,
                        self.store_policy.timeout,
                        store.delete_collection(collection),
                    )
                    .await
                    .map_err(build_err)?;
                }
            }
        }

        // Marked before creation: a cancelled create may still land.
        self.marker.set(collection);
        with_timeout(
            service,
            self.store_policy.timeout,
            store.create_collection(collection, dims),
        )
        .await
        .map_err(build_err)
    }

    async fn write_entries(
        &self,
        chunks: &[Chunk],
        collection: &str,
        identity: &EmbedderIdentity,
    ) -> std::result::Result<(), ServiceError> {
        let embedder = self.embedder.as_ref();
        let store = self.store.as_ref();
        let mut written = 0;

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = with_retries("embedding", &self.embed_policy, || {
                embedder.embed(&texts)
            })
            .await?;

            if vectors.len() != batch.len() {
                return Err(ServiceError::invalid(
                    "embedding",
                    format!("expected {} vectors, got {}", batch.len(), vectors.len()),
                ));
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != identity.dims) {
                return Err(ServiceError::invalid(
                    "embedding",
                    format!(
                        "expected {} dimensions, got {}",
                        identity.dims,
                        bad.len()
                    ),
                ));
            }

            let entries: Vec<IndexEntry> = batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| IndexEntry { chunk, vector })
                .collect();

            with_timeout(
                store.backend_name(),
                self.store_policy.timeout,
                store.upsert(collection, &entries, written, identity),
            )
            .await?;

            written += entries.len();
            debug!(collection, batch = batch_no, written, "stored batch");
        }
        Ok(())
    }

    /// Drop a partially built collection. Returns whether it is gone.
    async fn discard(&self, collection: &str) -> bool {
        let store = self.store.as_ref();
        let result = with_timeout(
            store.backend_name(),
            self.store_policy.timeout,
            store.delete_collection(collection),
        )
        .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(collection, error = %e, "could not drop partially built collection");
                false
            }
        }
    }
}
