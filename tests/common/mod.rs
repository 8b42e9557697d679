//! Deterministic stand-ins for the remote embedder and language model.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pdfqa::config::Config;
use pdfqa::embedding::EmbeddingProvider;
use pdfqa::error::ServiceError;
use pdfqa::generation::LanguageModel;
use pdfqa::prompt::PromptTemplate;
use pdfqa::retry::RetryPolicy;
use pdfqa::store::memory::InMemoryStore;
use pdfqa::RagPipeline;

pub const DIMS: usize = 26;

/// Letter-frequency embedder: texts sharing letters point the same way.
pub struct LetterEmbedder {
    pub model: String,
    pub calls: AtomicUsize,
    pub fail: bool,
    pub delay: Duration,
}

impl LetterEmbedder {
    pub fn new() -> Arc<Self> {
        Self::named("letters")
    }

    pub fn named(model: &str) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            fail: false,
            delay: Duration::ZERO,
        })
    }

    /// Sleeps `delay` before every batch.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            model: "letters".to_string(),
            calls: AtomicUsize::new(0),
            fail: false,
            delay,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            model: "letters".to_string(),
            calls: AtomicUsize::new(0),
            fail: true,
            delay: Duration::ZERO,
        })
    }
}

pub fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIMS];
    for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
        v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn provider_name(&self) -> &str {
        "fake"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(ServiceError::Transport {
                service: "fake".into(),
                message: "connection refused".into(),
            });
        }
        Ok(texts.iter().map(|t| letter_vector(t)).collect())
    }
}

/// Records every prompt and echoes a fixed reply, or fails with HTTP 503.
pub struct RecordingModel {
    pub prompts: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    fn model_name(&self) -> &str {
        "recording"
    }
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(ServiceError::Status {
                service: "fake llm".into(),
                status: 503,
                body: "overloaded".into(),
            });
        }
        Ok("generated answer".to_string())
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_secs(5)).with_base_delay(Duration::from_millis(1))
}

/// Config reading `.txt` files with small chunks and an in-memory store.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.loader.include_globs = vec!["*.txt".to_string(), "*.pdf".to_string()];
    config.chunking.chunk_size = 40;
    config.chunking.chunk_overlap = 10;
    config.vector_store.backend = "memory".to_string();
    config.vector_store.collection = "test_docs".to_string();
    config
}

pub fn template() -> PromptTemplate {
    PromptTemplate::parse("test", "CONTEXT:\n{context}\nQUESTION: {question}").unwrap()
}

pub fn pipeline_with(
    config: Config,
    embedder: Arc<LetterEmbedder>,
    store: Arc<InMemoryStore>,
    model: Arc<RecordingModel>,
) -> RagPipeline {
    RagPipeline::new(config, embedder, store, model, template())
        .unwrap()
        .with_retry_policies(fast_policy(), fast_policy())
}

/// Minimal one-page PDF showing `text` in Helvetica, with a correct xref table.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}
