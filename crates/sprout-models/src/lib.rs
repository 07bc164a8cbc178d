//! Completion-service clients for Sprout.
//!
//! This crate provides concrete implementations of the `Model` trait.
//!
//! # Supported Providers
//!
//! - **Mock**: Offline, deterministic output for tests and demos
//! - **OpenAI**: Any OpenAI-compatible `/chat/completions` endpoint (API key required)

pub mod factory;
pub mod openai;

use async_trait::async_trait;
use sprout_abstraction::{ChatMessage, ChatRole, Model, ModelError, ModelParameters, ModelResponse, ModelUsage};
use tracing::debug;

pub use factory::{ModelConfig, ModelFactory, ModelType};
pub use openai::OpenAIModel;

/// A mock implementation of the `Model` trait for testing and demonstration.
///
/// By default the reply echoes the prompt. A fixed reply or a fixed error can
/// be configured for tests that need a known outcome.
#[derive(Debug, Default, Clone)]
pub struct MockModel {
    id: String,
    reply: Option<String>,
    failure: Option<ModelError>,
}

impl MockModel {
    /// Creates a new `MockModel` with the given ID.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self { id, reply: None, failure: None }
    }

    /// Always answers with `reply`.
    #[must_use]
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(mut self, error: ModelError) -> Self {
        self.failure = Some(error);
        self
    }

    fn respond(&self, prompt_tokens: u32, echoed: &str) -> Result<ModelResponse, ModelError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let content = self
            .reply
            .clone()
            .unwrap_or_else(|| format!("Mock response for: {echoed}"));
        let usage = ModelUsage::new(prompt_tokens, count_tokens(&content));

        Ok(ModelResponse { content, model_id: Some(self.id.clone()), usage: Some(usage) })
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.id,
            prompt_len = prompt.len(),
            parameters = ?parameters,
            "MockModel generating text"
        );

        self.respond(count_tokens(prompt), prompt)
    }

    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.id,
            message_count = messages.len(),
            parameters = ?parameters,
            "MockModel generating chat completion"
        );

        let prompt_tokens = messages.iter().map(|m| count_tokens(&m.content)).sum::<u32>();
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map_or("", |m| m.content.as_str());

        self.respond(prompt_tokens, last_user)
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// Count tokens in a string (simplified: word count).
#[allow(clippy::cast_possible_truncation)]
fn count_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_model_echoes_prompt() {
        let model = MockModel::new("mock-model".to_string());
        let response = model.generate_text("What is a fraction?", None).await.unwrap();

        assert_eq!(response.content, "Mock response for: What is a fraction?");
        assert_eq!(response.model_id.as_deref(), Some("mock-model"));
        assert_eq!(response.usage.unwrap().prompt_tokens, 4);
    }

    #[tokio::test]
    async fn test_mock_model_chat_uses_last_user_message() {
        let model = MockModel::new("mock-model".to_string());
        let messages = vec![
            ChatMessage::system("You are a tutor"),
            ChatMessage::user("first"),
            ChatMessage::user("second"),
        ];
        let response = model.generate_chat_completion(&messages, None).await.unwrap();
        assert_eq!(response.content, "Mock response for: second");
    }

    #[tokio::test]
    async fn test_mock_model_fixed_reply_and_failure() {
        let model = MockModel::new("m".to_string()).with_reply("Great job!");
        assert_eq!(model.generate_text("anything", None).await.unwrap().content, "Great job!");

        let failing = MockModel::new("m".to_string())
            .failing(ModelError::RequestError("offline".to_string()));
        let err = failing.generate_text("anything", None).await.unwrap_err();
        assert_eq!(err, ModelError::RequestError("offline".to_string()));
    }
}
