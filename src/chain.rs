//! Question answering over a built index.
//!
//! [`AnswerChain::answer`] runs retrieve → assemble → generate for one
//! question. Calls share no mutable state, so any number may run
//! concurrently against the same chain.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::generation::{estimate_tokens, LanguageModel};
use crate::models::Answer;
use crate::prompt::PromptTemplate;
use crate::retrieve::Retriever;
use crate::retry::with_timeout;

/// Answer returned when retrieval finds nothing; the model is not called.
pub const NO_CONTEXT_ANSWER: &str =
    "I don't know: no indexed document content is available to answer this question.";

pub struct AnswerChain {
    retriever: Retriever,
    template: PromptTemplate,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
    max_input_tokens: usize,
    generation_timeout: Duration,
}

impl AnswerChain {
    pub fn new(
        retriever: Retriever,
        template: PromptTemplate,
        model: Arc<dyn LanguageModel>,
        top_k: usize,
        max_input_tokens: usize,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            template,
            model,
            top_k,
            max_input_tokens,
            generation_timeout,
        }
    }

    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let result = self.retriever.retrieve(question, self.top_k).await?;
        if result.is_empty() {
            debug!("no context retrieved; skipping generation");
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                supporting_chunks: Vec::new(),
            });
        }

        let supporting_chunks = result.chunks();
        let prompt = self.template.assemble(question, &supporting_chunks);

        let estimated_tokens = estimate_tokens(&prompt);
        if estimated_tokens > self.max_input_tokens {
            return Err(RagError::ContextTooLarge {
                estimated_tokens,
                limit: self.max_input_tokens,
            });
        }

        let model = self.model.model_name();
        let started = Instant::now();
        let text = with_timeout(model, self.generation_timeout, self.model.generate(&prompt))
            .await
            .map_err(|source| RagError::Generation {
                model: model.to_string(),
                source,
            })?;

        info!(
            model,
            chunks = supporting_chunks.len(),
            prompt_tokens = estimated_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generated answer"
        );

        Ok(Answer {
            text,
            supporting_chunks,
        })
    }
}
