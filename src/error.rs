//! Error types for the ingestion and retrieval pipeline.
//!
//! [`RagError`] is the taxonomy surfaced to callers of
//! [`RagPipeline`](crate::pipeline::RagPipeline). Every variant carries the
//! path, collection name, or upstream detail needed to show an actionable
//! message.
//!
//! [`ServiceError`] describes a failed call to a remote capability (embedder,
//! vector store, language model) and classifies whether the call may be
//! retried.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the pipeline and its components.
#[derive(Debug, Error)]
pub enum RagError {
    /// The input path does not exist.
    #[error("document path not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The path is neither a readable file nor a directory.
    #[error("not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    /// Text extraction failed (corrupt, encrypted, or unsupported file).
    #[error("could not extract text from {}: {detail}", path.display())]
    UnreadableDocument { path: PathBuf, detail: String },

    /// Invalid configuration value (chunking parameters, top_k, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Embedding or storage failed while building the index.
    #[error("index build for collection '{collection}' failed: {source}")]
    IndexBuild {
        collection: String,
        #[source]
        source: ServiceError,
    },

    /// The build would have reused an existing collection.
    #[error("collection '{collection}' already exists; choose a fresh collection name or set vector_store.on_existing = \"replace\"")]
    CollectionExists { collection: String },

    /// The query-time embedder differs from the build-time embedder.
    #[error("embedding mismatch for collection '{collection}': index built with {indexed}, query embedder is {query}")]
    EmbeddingMismatch {
        collection: String,
        indexed: String,
        query: String,
    },

    /// The prompt template could not be fetched or parsed.
    #[error("prompt template '{source_id}' unavailable: {detail}")]
    TemplateUnavailable { source_id: String, detail: String },

    /// The language model call failed.
    #[error("generation with model '{model}' failed: {source}")]
    Generation {
        model: String,
        #[source]
        source: ServiceError,
    },

    /// Retrieval (query embedding or search) failed.
    #[error("retrieval from collection '{collection}' failed: {source}")]
    Retrieval {
        collection: String,
        #[source]
        source: ServiceError,
    },

    /// The assembled prompt exceeds the model's input limit.
    #[error("prompt of ~{estimated_tokens} tokens exceeds the model input limit of {limit} tokens")]
    ContextTooLarge { estimated_tokens: usize, limit: usize },

    /// `answer` was called before a successful `initialize`.
    #[error("pipeline is not ready: call initialize first")]
    NotReady,

    /// Another `initialize` is already running on this pipeline.
    #[error("pipeline is already initializing")]
    AlreadyInitializing,

    /// `initialize` was called on a pipeline that is already ready.
    #[error("pipeline is already initialized")]
    AlreadyInitialized,
}

/// Convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Failure of a single request to a remote service.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// No response within the configured deadline.
    #[error("{service} request timed out")]
    Timeout { service: String },

    /// Connection-level failure (DNS, refused, reset).
    #[error("{service} unreachable: {message}")]
    Transport { service: String, message: String },

    /// Non-success HTTP status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    /// The response could not be interpreted.
    #[error("invalid response from {service}: {message}")]
    InvalidResponse { service: String, message: String },
}

impl ServiceError {
    /// Whether a retry of the same idempotent request may succeed.
    ///
    /// Timeouts, transport failures, HTTP 429 and 5xx are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Timeout { .. } | ServiceError::Transport { .. } => true,
            ServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            ServiceError::InvalidResponse { .. } => false,
        }
    }

    pub(crate) fn transport(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ServiceError::Timeout {
                service: service.to_string(),
            };
        }
        ServiceError::Transport {
            service: service.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid(service: &str, message: impl Into<String>) -> Self {
        ServiceError::InvalidResponse {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Turn a non-success response into a [`ServiceError::Status`].
    pub(crate) async fn from_response(service: &str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ServiceError::Status {
            service: service.to_string(),
            status,
            body,
        }
    }
}
