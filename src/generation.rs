//! Language model abstraction.
//!
//! [`LanguageModel`] turns an assembled prompt into answer text. The only
//! shipped implementation is [`OpenAIChatModel`], which sends the prompt as a
//! single user message to an OpenAI-compatible `/chat/completions` endpoint.
//!
//! Generation is never retried here: a repeated call costs money and may
//! produce a different answer, so the decision belongs to the caller.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::ServiceError;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const SERVICE: &str = "openai chat";

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier used in logs and errors (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`. One request, no retries.
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ServiceError>;
}

/// Chat model served by the OpenAI API or a compatible server.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIChatModel {
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not set.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ => bail!("OPENAI_API_KEY environment variable not set"),
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, ServiceError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::transport(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(ServiceError::from_response(SERVICE, response).await);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::invalid(SERVICE, e.to_string()))?;
        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> std::result::Result<String, ServiceError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| ServiceError::invalid(SERVICE, "missing choices[0].message.content"))
}

/// Create the [`LanguageModel`] selected by `config.provider`.
pub fn create_model(config: &GenerationConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIChatModel::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// Rough token count for `text`, at four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
