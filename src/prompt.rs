//! Prompt templates and assembly.
//!
//! A template is plain text with exactly two placeholders, `{context}` and
//! `{question}`. Literal braces are written `{{` and `}}`. Templates are
//! loaded once at startup from one of:
//!
//! | Source | Example |
//! |--------|---------|
//! | builtin | `builtin:rag-prompt` |
//! | URL | `https://example.com/prompts/rag.txt` |
//! | file | `./prompts/rag.txt` |
//!
//! A source that cannot be read, or a template with missing, unknown, or
//! malformed placeholders, fails with
//! [`RagError::TemplateUnavailable`]. There is no fallback template.

use tracing::debug;

use crate::config::PromptConfig;
use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Separator placed between chunk texts in the `{context}` slot.
pub const CONTEXT_DELIMITER: &str = "\n\n";

const BUILTIN_RAG_PROMPT: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.\n\
Question: {question}\n\
Context: {context}\n\
Answer:";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Context,
    Question,
}

/// A parsed, validated prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source_id: String,
    parts: Vec<Part>,
}

impl PromptTemplate {
    /// Load and parse the template named by `config.source`.
    pub async fn load(config: &PromptConfig) -> Result<Self> {
        let source = config.source.as_str();
        let text = if let Some(name) = source.strip_prefix("builtin:") {
            builtin(name)
                .ok_or_else(|| unavailable(source, format!("no builtin template named '{}'", name)))?
                .to_string()
        } else if source.starts_with("http://") || source.starts_with("https://") {
            fetch(source, config).await?
        } else {
            tokio::fs::read_to_string(source)
                .await
                .map_err(|e| unavailable(source, e))?
        };

        let template = Self::parse(source, &text)?;
        debug!(source, "loaded prompt template");
        Ok(template)
    }

    /// Parse template text, requiring exactly the `context` and `question` placeholders.
    pub fn parse(source_id: &str, text: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => name.push(ch),
                            None => return Err(unavailable(source_id, "unclosed '{' in template")),
                        }
                    }
                    let part = match name.trim() {
                        "context" => Part::Context,
                        "question" => Part::Question,
                        other => {
                            return Err(unavailable(
                                source_id,
                                format!("unknown placeholder '{{{}}}'", other),
                            ))
                        }
                    };
                    if !literal.is_empty() {
                        parts.push(Part::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(part);
                }
                '}' => return Err(unavailable(source_id, "unmatched '}' in template")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        for (required, name) in [(Part::Context, "context"), (Part::Question, "question")] {
            if !parts.contains(&required) {
                return Err(unavailable(
                    source_id,
                    format!("template is missing the '{{{}}}' placeholder", name),
                ));
            }
        }

        Ok(Self {
            source_id: source_id.to_string(),
            parts,
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Fill the slots. Inserted values are never re-scanned for placeholders.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Context => out.push_str(context),
                Part::Question => out.push_str(question),
            }
        }
        out
    }

    /// Render with retrieved chunks joined in rank order.
    ///
    /// Chunk text is inserted whole; size limits are enforced by the caller.
    pub fn assemble(&self, question: &str, context_chunks: &[Chunk]) -> String {
        let context = context_chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_DELIMITER);
        self.render(&context, question)
    }
}

fn builtin(name: &str) -> Option<&'static str> {
    match name {
        "rag-prompt" => Some(BUILTIN_RAG_PROMPT),
        _ => None,
    }
}

async fn fetch(url: &str, config: &PromptConfig) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| unavailable(url, e))?;
    let response = client.get(url).send().await.map_err(|e| unavailable(url, e))?;
    if !response.status().is_success() {
        return Err(unavailable(url, format!("HTTP {}", response.status())));
    }
    response.text().await.map_err(|e| unavailable(url, e))
}

fn unavailable(source_id: &str, detail: impl ToString) -> RagError {
    RagError::TemplateUnavailable {
        source_id: source_id.to_string(),
        detail: detail.to_string(),
    }
}
