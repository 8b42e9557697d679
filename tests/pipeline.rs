//! End-to-end pipeline behavior with an in-memory store and fake services.

mod common;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pdfqa::chain::NO_CONTEXT_ANSWER;
use pdfqa::config::OnExisting;
use pdfqa::embedding::EmbedderIdentity;
use pdfqa::error::ServiceError;
use pdfqa::models::{IndexEntry, ScoredChunk};
use pdfqa::store::memory::InMemoryStore;
use pdfqa::store::VectorStore;
use pdfqa::{RagError, RagPipeline};
use tempfile::TempDir;

use common::{fast_policy, pipeline_with, template, test_config, LetterEmbedder, RecordingModel};

fn corpus() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("fruit.txt"),
        "Apples grow on apple trees in orchards.\n\nBananas are yellow and grow in bunches.",
    )
    .unwrap();
    fs::write(
        tmp.path().join("rust.txt"),
        "Rust has ownership and borrowing.\n\nThe borrow checker rejects dangling references.",
    )
    .unwrap();
    fs::write(tmp.path().join("ignored.csv"), "a,b,c").unwrap();
    tmp
}

#[tokio::test]
async fn answers_with_supporting_chunks() {
    let dir = corpus();
    let model = RecordingModel::new();
    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline_with(test_config(), LetterEmbedder::new(), store.clone(), model.clone());

    let index = pipeline.initialize(dir.path()).await.unwrap();
    assert_eq!(index.collection(), "test_docs");
    assert!(index.len() >= 4);
    assert_eq!(store.count("test_docs").await.unwrap(), index.len());

    let answer = pipeline.answer("Where do apples grow?").await.unwrap();
    assert_eq!(answer.text, "generated answer");
    assert_eq!(answer.supporting_chunks.len(), 3);

    let prompt = model.last_prompt().unwrap();
    assert!(prompt.ends_with("QUESTION: Where do apples grow?"));
    for chunk in &answer.supporting_chunks {
        assert!(prompt.contains(&chunk.text));
    }
}

#[tokio::test]
async fn empty_directory_gives_no_context_answer() {
    let dir = TempDir::new().unwrap();
    let model = RecordingModel::new();
    let pipeline = pipeline_with(
        test_config(),
        LetterEmbedder::new(),
        Arc::new(InMemoryStore::new()),
        model.clone(),
    );

    let index = pipeline.initialize(dir.path()).await.unwrap();
    assert!(index.is_empty());

    let answer = pipeline.answer("anything?").await.unwrap();
    assert_eq!(answer.text, NO_CONTEXT_ANSWER);
    assert!(answer.supporting_chunks.is_empty());
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn answer_before_initialize_is_not_ready() {
    let pipeline = pipeline_with(
        test_config(),
        LetterEmbedder::new(),
        Arc::new(InMemoryStore::new()),
        RecordingModel::new(),
    );
    assert!(matches!(
        pipeline.answer("hello?").await,
        Err(RagError::NotReady)
    ));
}

#[tokio::test]
async fn bad_paths_leave_pipeline_retryable() {
    let dir = corpus();
    let pipeline = pipeline_with(
        test_config(),
        LetterEmbedder::new(),
        Arc::new(InMemoryStore::new()),
        RecordingModel::new(),
    );

    let err = pipeline
        .initialize(Path::new("/no/such/file.pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NotFound { .. }));

    let err = pipeline
        .initialize(Path::new("/no/such/folder/"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NotADirectory { .. }));
    assert!(!pipeline.is_ready().await);

    pipeline.initialize(dir.path()).await.unwrap();
    assert!(pipeline.is_ready().await);
}

#[tokio::test]
async fn second_initialize_is_rejected() {
    let dir = corpus();
    let pipeline = pipeline_with(
        test_config(),
        LetterEmbedder::new(),
        Arc::new(InMemoryStore::new()),
        RecordingModel::new(),
    );
    pipeline.initialize(dir.path()).await.unwrap();
    assert!(matches!(
        pipeline.initialize(dir.path()).await,
        Err(RagError::AlreadyInitialized)
    ));
}

#[tokio::test]
async fn concurrent_initialize_is_serialized() {
    let dir = corpus();
    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline_with(
        test_config(),
        LetterEmbedder::new(),
        store.clone(),
        RecordingModel::new(),
    );

    let (a, b) = tokio::join!(
        pipeline.initialize(dir.path()),
        pipeline.initialize(dir.path())
    );
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(RagError::AlreadyInitializing))));

    let built = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
    assert_eq!(store.count("test_docs").await.unwrap(), built.len());
}

#[tokio::test]
async fn concurrent_answers_share_the_index() {
    let dir = corpus();
    let model = RecordingModel::new();
    let pipeline = pipeline_with(
        test_config(),
        LetterEmbedder::new(),
        Arc::new(InMemoryStore::new()),
        model.clone(),
    );
    pipeline.initialize(dir.path()).await.unwrap();

    let (a, b, c) = tokio::join!(
        pipeline.answer("apples?"),
        pipeline.answer("borrowing?"),
        pipeline.answer("bananas?")
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(model.calls(), 3);
}

#[tokio::test]
async fn index_build_failure_stays_uninitialized() {
    let dir = corpus();
    let embedder = LetterEmbedder::failing();
    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline_with(test_config(), embedder.clone(), store.clone(), RecordingModel::new());

    let err = pipeline.initialize(dir.path()).await.unwrap_err();
    assert!(matches!(err, RagError::IndexBuild { ref collection, .. } if collection == "test_docs"));
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    assert!(!pipeline.is_ready().await);
    assert!(!store.collection_exists("test_docs").await.unwrap());
}

/// In-memory store whose writes and drops fail while `down` is set.
struct FlakyStore {
    inner: InMemoryStore,
    down: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> Result<(), ServiceError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ServiceError::Transport {
                service: "flaky".into(),
                message: "connection reset".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    fn backend_name(&self) -> &str {
        "flaky"
    }
    async fn collection_exists(&self, collection: &str) -> Result<bool, ServiceError> {
        self.inner.collection_exists(collection).await
    }
    async fn create_collection(&self, collection: &str, dims: usize) -> Result<(), ServiceError> {
        self.inner.create_collection(collection, dims).await
    }
    async fn delete_collection(&self, collection: &str) -> Result<(), ServiceError> {
        self.check()?;
        self.inner.delete_collection(collection).await
    }
    async fn upsert(
        &self,
        collection: &str,
        entries: &[IndexEntry],
        first_seq: usize,
        embedder: &EmbedderIdentity,
    ) -> Result<(), ServiceError> {
        self.check()?;
        self.inner.upsert(collection, entries, first_seq, embedder).await
    }
    async fn search(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError> {
        self.inner.search(collection, query_vec, limit).await
    }
    async fn count(&self, collection: &str) -> Result<usize, ServiceError> {
        self.inner.count(collection).await
    }
}

#[tokio::test]
async fn retry_succeeds_after_store_outage_left_a_collection() {
    let dir = corpus();
    let store = Arc::new(FlakyStore {
        inner: InMemoryStore::new(),
        down: AtomicBool::new(true),
    });
    let pipeline = RagPipeline::new(
        test_config(),
        LetterEmbedder::new(),
        store.clone(),
        RecordingModel::new(),
        template(),
    )
    .unwrap()
    .with_retry_policies(fast_policy(), fast_policy());

    let err = pipeline.initialize(dir.path()).await.unwrap_err();
    assert!(matches!(err, RagError::IndexBuild { .. }));
    // The cleanup drop failed too, so the half-built collection is still there.
    assert!(store.collection_exists("test_docs").await.unwrap());

    store.down.store(false, Ordering::SeqCst);
    let index = pipeline.initialize(dir.path()).await.unwrap();
    assert!(pipeline.is_ready().await);
    assert_eq!(store.count("test_docs").await.unwrap(), index.len());
}

#[tokio::test]
async fn retry_succeeds_after_cancelled_initialize() {
    let dir = corpus();
    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline_with(
        test_config(),
        LetterEmbedder::slow(Duration::from_millis(200)),
        store.clone(),
        RecordingModel::new(),
    );

    let cancelled =
        tokio::time::timeout(Duration::from_millis(50), pipeline.initialize(dir.path())).await;
    assert!(cancelled.is_err());
    assert!(!pipeline.is_ready().await);
    assert!(store.collection_exists("test_docs").await.unwrap());

    let index = pipeline.initialize(dir.path()).await.unwrap();
    assert!(pipeline.is_ready().await);
    assert_eq!(store.count("test_docs").await.unwrap(), index.len());
}

#[tokio::test]
async fn reused_collection_is_rejected_unless_replacing() {
    let dir = corpus();
    let store = Arc::new(InMemoryStore::new());

    let first = pipeline_with(test_config(), LetterEmbedder::new(), store.clone(), RecordingModel::new());
    let built = first.initialize(dir.path()).await.unwrap();

    let second = pipeline_with(test_config(), LetterEmbedder::new(), store.clone(), RecordingModel::new());
    let err = second.initialize(dir.path()).await.unwrap_err();
    assert!(matches!(err, RagError::CollectionExists { .. }));
    assert_eq!(store.count("test_docs").await.unwrap(), built.len());

    let mut config = test_config();
    config.vector_store.on_existing = OnExisting::Replace;
    let third = pipeline_with(config, LetterEmbedder::new(), store.clone(), RecordingModel::new());
    third.initialize(dir.path()).await.unwrap();
    assert_eq!(store.count("test_docs").await.unwrap(), built.len());
}

#[tokio::test]
async fn separate_collections_coexist() {
    let fruit = TempDir::new().unwrap();
    fs::write(fruit.path().join("a.txt"), "Apples and pears.").unwrap();
    let code = TempDir::new().unwrap();
    fs::write(code.path().join("b.txt"), "Compilers and borrow checkers.").unwrap();

    let store = Arc::new(InMemoryStore::new());
    let mut other = test_config();
    other.vector_store.collection = "code_docs".to_string();

    let a = pipeline_with(test_config(), LetterEmbedder::new(), store.clone(), RecordingModel::new());
    let b = pipeline_with(other, LetterEmbedder::new(), store.clone(), RecordingModel::new());
    a.initialize(fruit.path()).await.unwrap();
    b.initialize(code.path()).await.unwrap();

    let answer = a.answer("pears?").await.unwrap();
    assert!(answer
        .supporting_chunks
        .iter()
        .all(|c| c.source_path.ends_with("a.txt")));
}

#[tokio::test]
async fn oversized_prompt_is_reported() {
    let dir = corpus();
    let model = RecordingModel::new();
    let mut config = test_config();
    config.generation.max_input_tokens = 10;
    let pipeline = pipeline_with(config, LetterEmbedder::new(), Arc::new(InMemoryStore::new()), model.clone());
    pipeline.initialize(dir.path()).await.unwrap();

    let err = pipeline.answer("Where do apples grow?").await.unwrap_err();
    assert!(matches!(err, RagError::ContextTooLarge { limit: 10, .. }));
    assert_eq!(model.calls(), 0);
    assert!(pipeline.is_ready().await);
}

#[tokio::test]
async fn generation_failure_is_not_retried() {
    let dir = corpus();
    let model = RecordingModel::failing();
    let pipeline = pipeline_with(test_config(), LetterEmbedder::new(), Arc::new(InMemoryStore::new()), model.clone());
    pipeline.initialize(dir.path()).await.unwrap();

    let err = pipeline.answer("apples?").await.unwrap_err();
    match err {
        RagError::Generation { model: name, source } => {
            assert_eq!(name, "recording");
            assert!(source.is_retryable());
        }
        other => panic!("expected generation error, got {other:?}"),
    }
    assert_eq!(model.calls(), 1);
    assert!(pipeline.is_ready().await);
}

#[tokio::test]
async fn invalid_chunking_is_rejected_up_front() {
    let mut config = test_config();
    config.chunking.chunk_overlap = config.chunking.chunk_size;
    let result = pdfqa::RagPipeline::new(
        config,
        LetterEmbedder::new(),
        Arc::new(InMemoryStore::new()),
        RecordingModel::new(),
        common::template(),
    );
    assert!(matches!(result, Err(RagError::InvalidConfig(_))));
}
