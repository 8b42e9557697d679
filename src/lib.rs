//! # pdfqa
//!
//! Retrieval-augmented question answering over PDF documents.
//!
//! Documents are split into overlapping chunks, embedded, and written to a
//! vector collection once. Each question then retrieves the closest chunks,
//! renders them into a prompt template, and asks a language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌─────────────┐
//! │  Loader  │──▶│ Splitter │──▶│ IndexBuilder │──▶│ VectorStore │
//! │ PDF/text │   │  chunks  │   │ embed+upsert │   │ Qdrant/mem  │
//! └──────────┘   └──────────┘   └──────────────┘   └──────┬──────┘
//!                                                         │
//!        question ──▶ Retriever ──▶ PromptTemplate ──▶ LanguageModel ──▶ Answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! pdfqa ask ./papers "What is the main contribution?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`loader`] | Document loading |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store backends |
//! | [`index`] | Index building |
//! | [`retrieve`] | Top-k retrieval |
//! | [`prompt`] | Prompt templates |
//! | [`generation`] | Language model abstraction |
//! | [`chain`] | Retrieve, assemble, generate |
//! | [`pipeline`] | Lifecycle facade |
//! | [`retry`] | Timeouts and retries |

pub mod chain;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod retry;
pub mod store;

pub use error::{RagError, Result};
pub use pipeline::RagPipeline;
