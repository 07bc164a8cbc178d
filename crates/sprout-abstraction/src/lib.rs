//! Text-completion abstraction for Sprout.
//!
//! The tutoring engine never talks to a language model directly. Leaf agents
//! (content generation, communication) hold a [`Model`] and treat it as an
//! opaque, possibly slow, possibly failing request-text/response-text service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from a completion service.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// The request never got an answer (network, DNS, TLS).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The service answered with an error or an empty completion.
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// The answer could not be decoded.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The provider is unknown or missing credentials.
    #[error("Unsupported Model Provider: {0}")]
    UnsupportedModelProvider(String),

    /// The provider refused the request for billing or rate reasons.
    #[error("Provider '{provider}' quota exceeded{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    QuotaExceeded {
        /// Provider name, e.g. "openai".
        provider: String,
        /// Provider's explanation, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions for the tutor persona.
    System,
    /// The learner.
    User,
    /// The tutor.
    Assistant,
}

impl ChatRole {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: ChatRole,
    /// What was said.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system turn.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    /// Creates a learner turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    /// Creates a tutor turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Sampling settings for one request. `None` leaves the provider default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Sampling temperature in [0, 2].
    pub temperature: Option<f32>,
    /// Nucleus sampling mass.
    pub top_p: Option<f32>,
    /// Completion length cap.
    pub max_tokens: Option<u32>,
    /// Sequences that end the completion.
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self { temperature: Some(0.7), top_p: Some(1.0), max_tokens: Some(256), stop_sequences: None }
    }
}

/// A completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Generated text.
    pub content: String,
    /// Model that produced it, if the provider says.
    pub model_id: Option<String>,
    /// Token accounting, if the provider reports it.
    pub usage: Option<ModelUsage>,
}

/// Token accounting for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Tokens sent.
    pub prompt_tokens: u32,
    /// Tokens generated.
    pub completion_tokens: u32,
    /// Sum of both.
    pub total_tokens: u32,
}

impl ModelUsage {
    /// Builds usage with the total filled in.
    #[must_use]
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self { prompt_tokens, completion_tokens, total_tokens: prompt_tokens + completion_tokens }
    }
}

/// A text-completion service.
///
/// Implementations are shared between agents, so they must be `Send + Sync`.
#[async_trait]
pub trait Model: Send + Sync {
    /// Completes a single prompt.
    ///
    /// # Errors
    /// Returns a `ModelError` if generation fails.
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError>;

    /// Completes a conversation, answering its last turn.
    ///
    /// # Errors
    /// Returns a `ModelError` if generation fails.
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError>;

    /// ID of the underlying model.
    fn model_id(&self) -> &str;
}
