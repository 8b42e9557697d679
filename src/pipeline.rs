//! The question-answering facade.
//!
//! A [`RagPipeline`] owns one document set's lifecycle:
//!
//! ```text
//!  UNINITIALIZED ──initialize(path)──▶ READY ──answer(q)──▶ READY
//!        ▲                 │
//!        └──── failure ────┘
//! ```
//!
//! `initialize` runs load → split → build exactly once. It is guarded
//! against concurrent calls (the loser gets
//! [`RagError::AlreadyInitializing`]) and leaves the pipeline uninitialized
//! on failure, so it can simply be called again. That includes a failed or
//! cancelled build whose collection could not be dropped: the pipeline keeps
//! a [`BuildMarker`] and the retry removes the leftover before applying
//! `on_existing`. `answer` only reads the ready state and may run
//! concurrently from many tasks.
//!
//! Pipelines hold no global state; several can coexist in one process, each
//! with its own collection.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::chain::AnswerChain;
use crate::chunk;
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{create_model, LanguageModel};
use crate::index::{BuildMarker, IndexBuilder, VectorIndex};
use crate::loader::DocumentLoader;
use crate::models::Answer;
use crate::prompt::PromptTemplate;
use crate::retrieve::Retriever;
use crate::retry::RetryPolicy;
use crate::store::{create_store, VectorStore};

enum PipelineState {
    Uninitialized,
    Ready(Arc<AnswerChain>),
}

pub struct RagPipeline {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
    embed_policy: RetryPolicy,
    store_policy: RetryPolicy,
    state: RwLock<PipelineState>,
    build_guard: Mutex<()>,
    marker: BuildMarker,
}

impl RagPipeline {
    /// Assemble a pipeline from already constructed capabilities.
    ///
    /// Fails with [`RagError::InvalidConfig`] for unusable chunking or
    /// retrieval parameters.
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        model: Arc<dyn LanguageModel>,
        template: PromptTemplate,
    ) -> Result<Self> {
        chunk::validate_params(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        if config.retrieval.top_k == 0 {
            return Err(RagError::InvalidConfig(
                "retrieval.top_k must be >= 1".to_string(),
            ));
        }

        let embed_policy =
            RetryPolicy::new(config.embedding.max_retries, config.embedding.timeout());
        let store_policy = RetryPolicy::new(
            config.vector_store.max_retries,
            config.vector_store.timeout(),
        );

        Ok(Self {
            config,
            embedder,
            store,
            model,
            template,
            embed_policy,
            store_policy,
            state: RwLock::new(PipelineState::Uninitialized),
            build_guard: Mutex::new(()),
            marker: BuildMarker::new(),
        })
    }

    /// Build every capability from configuration and load the prompt template.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let store = create_store(&config.vector_store)?;
        let model: Arc<dyn LanguageModel> = Arc::from(create_model(&config.generation)?);
        let template = PromptTemplate::load(&config.prompt).await?;
        Ok(Self::new(config, embedder, store, model, template)?)
    }

    /// Override the retry policies used for embedding and vector store calls.
    pub fn with_retry_policies(mut self, embed: RetryPolicy, store: RetryPolicy) -> Self {
        self.embed_policy = embed;
        self.store_policy = store;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.read().await, PipelineState::Ready(_))
    }

    /// Load, split, and index `path` (a document file or a directory).
    ///
    /// Returns the handle of the built collection. On any failure the
    /// pipeline stays uninitialized.
    pub async fn initialize(&self, path: &Path) -> Result<VectorIndex> {
        let _guard = self
            .build_guard
            .try_lock()
            .map_err(|_| RagError::AlreadyInitializing)?;
        if self.is_ready().await {
            return Err(RagError::AlreadyInitialized);
        }

        let loader = DocumentLoader::new(&self.config.loader)?;
        let target = path.to_path_buf();
        let documents = tokio::task::spawn_blocking(move || loader.load(&target))
            .await
            .map_err(|e| RagError::UnreadableDocument {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })??;

        let chunking = &self.config.chunking;
        let chunks =
            chunk::split_documents(&documents, chunking.chunk_size, chunking.chunk_overlap)?;
        info!(
            path = %path.display(),
            documents = documents.len(),
            chunks = chunks.len(),
            "documents split"
        );

        let index = IndexBuilder::new(Arc::clone(&self.embedder), Arc::clone(&self.store), &self.config)
            .with_retry_policies(self.embed_policy.clone(), self.store_policy.clone())
            .with_marker(self.marker.clone())
            .build(&chunks, &self.config.vector_store.collection)
            .await?;

        let retriever = Retriever::new(
            index.clone(),
            Arc::clone(&self.embedder),
            self.embed_policy.clone(),
            self.store_policy.clone(),
        )?;
        let generation = &self.config.generation;
        let chain = AnswerChain::new(
            retriever,
            self.template.clone(),
            Arc::clone(&self.model),
            self.config.retrieval.top_k,
            generation.max_input_tokens,
            generation.timeout(),
        );

        *self.state.write().await = PipelineState::Ready(Arc::new(chain));
        Ok(index)
    }

    /// Answer `question` from the indexed documents.
    ///
    /// Fails with [`RagError::NotReady`] before a successful
    /// [`initialize`](Self::initialize). Errors never change pipeline state.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let chain = match &*self.state.read().await {
            PipelineState::Ready(chain) => Arc::clone(chain),
            PipelineState::Uninitialized => return Err(RagError::NotReady),
        };
        chain.answer(question).await
    }
}
