//! Language model seam.
//!
//! Handlers talk to the model through [`LanguageModel`] so the metering path
//! can be exercised without a provider. Every call reports its token usage in
//! the returned [`Completion`].

use async_trait::async_trait;

use campused_core::{ChatMessage, UsageReport};

/// Errors from a language model call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned an error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// No provider is configured.
    #[error("language model not configured")]
    NotConfigured,
}

/// Text produced by one model call and the tokens it consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Output text.
    pub text: String,
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
}

impl Completion {
    /// Record this call's usage under `model`.
    ///
    /// The requested model name is used, not the provider's echo, so the
    /// entry always prices against the configured table.
    pub fn record_into(&self, usage: &mut UsageReport, model: &str) {
        usage.record(model, self.input_tokens, self.output_tokens);
    }
}

/// A provider of chat, vision and structured completions.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Answer a conversation.
    async fn generate_text(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Completion, LlmError>;

    /// Transcribe or describe an image.
    async fn analyze_image(
        &self,
        model: &str,
        image: &[u8],
        content_type: &str,
    ) -> Result<Completion, LlmError>;

    /// Produce JSON matching `schema`. The returned text is the raw JSON.
    async fn generate_structured(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<Completion, LlmError>;
}

/// Stand-in used when no provider key is configured. Every call fails
/// with [`LlmError::NotConfigured`] before anything billable happens.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredModel;

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    async fn generate_text(&self, _: &str, _: &[ChatMessage]) -> Result<Completion, LlmError> {
        Err(LlmError::NotConfigured)
    }

    async fn analyze_image(&self, _: &str, _: &[u8], _: &str) -> Result<Completion, LlmError> {
        Err(LlmError::NotConfigured)
    }

    async fn generate_structured(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: &str,
        _: &serde_json::Value,
    ) -> Result<Completion, LlmError> {
        Err(LlmError::NotConfigured)
    }
}
