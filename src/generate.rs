//! Text-generation seam: the [`TextGenerator`] trait and its LLM-backed
//! implementation.
//!
//! The pipeline only ever needs one operation — "given a system instruction
//! and a user prompt, give me the completion text" — so that is the whole
//! trait. Tests substitute a canned fake; production code wraps an
//! [`edgequake_llm::LLMProvider`] via [`LlmGenerator`].

use crate::error::IngestError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// A failure inside the generation service (transport, auth, content filter).
///
/// Deliberately opaque: the structurer does not retry these, it only
/// surfaces them.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct GenerateError(pub String);

/// The narrow interface the structurer needs from a text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one completion. `temperature` is forwarded verbatim; the
    /// structurer always passes 0.0 for deterministic output.
    async fn generate(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, GenerateError>;
}

/// [`TextGenerator`] backed by an [`edgequake_llm::LLMProvider`].
pub struct LlmGenerator {
    provider: Arc<dyn LLMProvider>,
    /// Maximum tokens per completion. `None` leaves the provider unbounded,
    /// which large documents need.
    max_tokens: Option<usize>,
}

impl LlmGenerator {
    /// Wrap a pre-constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, max_tokens: Option<usize>) -> Self {
        Self {
            provider,
            max_tokens,
        }
    }

    /// Resolve a provider from the environment.
    ///
    /// Prefers OpenAI when `OPENAI_API_KEY` is set (so users holding several
    /// provider keys get a deterministic choice), then falls back to
    /// [`ProviderFactory::from_env`] auto-detection. A missing key surfaces
    /// as [`IngestError::ProviderNotConfigured`] before any document is read.
    pub fn from_env(model: Option<&str>) -> Result<Self, IngestError> {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                let model = model.unwrap_or("gpt-4.1");
                let provider =
                    ProviderFactory::create_llm_provider("openai", model).map_err(|e| {
                        IngestError::ProviderNotConfigured {
                            hint: format!("{e}"),
                        }
                    })?;
                return Ok(Self::new(provider, None));
            }
        }

        let (provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| IngestError::ProviderNotConfigured {
                hint: format!(
                    "No text-generation provider could be auto-detected from environment.\n\
                     Set OPENAI_API_KEY or another supported provider key.\n\
                     Error: {e}"
                ),
            })?;

        Ok(Self::new(provider, None))
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, GenerateError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];

        let options = CompletionOptions {
            temperature: Some(temperature),
            max_tokens: self.max_tokens,
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| GenerateError(format!("{e}")))?;

        debug!(
            "completion: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        Ok(response.content)
    }
}
