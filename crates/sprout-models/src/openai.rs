//! OpenAI-compatible model implementation.
//!
//! Works against api.openai.com or any server exposing the same
//! `/chat/completions` contract.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sprout_abstraction::{ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ModelUsage};
use std::env;
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const API_KEY_VAR: &str = "OPENAI_API_KEY";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for an OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone)]
pub struct OpenAIModel {
    model_id: String,
    api_key: String,
    base_url: String,
    client: Client,
}

impl OpenAIModel {
    /// Creates a client, reading the key from `OPENAI_API_KEY`.
    ///
    /// # Errors
    /// Returns `UnsupportedModelProvider` if the variable is not set.
    pub fn new(model_id: String) -> Result<Self, ModelError> {
        let api_key = env::var(API_KEY_VAR)
            .map_err(|_| ModelError::UnsupportedModelProvider(format!("{API_KEY_VAR} environment variable not set")))?;
        Ok(Self::with_api_key(model_id, api_key))
    }

    /// Creates a client with an explicit key.
    #[must_use]
    pub fn with_api_key(model_id: String, api_key: String) -> Self {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_else(|_| Client::new());
        Self { model_id, api_key, base_url: DEFAULT_BASE_URL.to_string(), client }
    }

    /// Points the client at a different OpenAI-compatible endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body<'a>(&'a self, messages: &'a [ChatMessage], parameters: Option<ModelParameters>) -> WireRequest<'a> {
        let parameters = parameters.unwrap_or_default();
        WireRequest {
            model: &self.model_id,
            messages: messages
                .iter()
                .map(|m| WireTurn { role: m.role.as_str(), content: &m.content })
                .collect(),
            temperature: parameters.temperature,
            top_p: parameters.top_p,
            max_tokens: parameters.max_tokens,
            stop: parameters.stop_sequences,
        }
    }
}

/// 402 and 429 mean the account is out of credit or rate limited.
fn status_error(status: StatusCode, body: String) -> ModelError {
    match status {
        StatusCode::PAYMENT_REQUIRED | StatusCode::TOO_MANY_REQUESTS => {
            ModelError::QuotaExceeded { provider: "openai".to_string(), message: Some(body) }
        }
        _ => ModelError::ModelResponseError(format!("API error ({status}): {body}")),
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        self.generate_chat_completion(&[ChatMessage::user(prompt)], parameters).await
    }

    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(model_id = %self.model_id, turns = messages.len(), "Requesting chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, parameters))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Completion request failed");
                ModelError::RequestError(format!("Network error: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, body = %body, "Completion service returned an error");
            return Err(status_error(status, body));
        }

        let reply: WireReply = response
            .json()
            .await
            .map_err(|e| ModelError::SerializationError(format!("Failed to parse response: {e}")))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ModelError::ModelResponseError("No content in API response".to_string()))?;

        Ok(ModelResponse {
            content,
            model_id: Some(self.model_id.clone()),
            usage: reply.usage.map(|u| ModelUsage::new(u.prompt_tokens, u.completion_tokens)),
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireTurn<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct WireTurn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireContent,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_model_creation_with_api_key() {
        let model = OpenAIModel::with_api_key("gpt-4o-mini".to_string(), "test-key".to_string())
            .with_base_url("http://localhost:8000/v1/");
        assert_eq!(model.model_id(), "gpt-4o-mini");
        assert_eq!(model.base_url, "http://localhost:8000/v1");
    }

    #[tokio::test]
    async fn test_generate_text_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"Fractions are parts of a whole!"}}],
                    "usage":{"prompt_tokens":5,"completion_tokens":6,"total_tokens":11}}"#,
            )
            .create_async()
            .await;

        let model = OpenAIModel::with_api_key("gpt-4o-mini".to_string(), "test-key".to_string())
            .with_base_url(server.url());
        let response = model.generate_text("Explain fractions", None).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "Fractions are parts of a whole!");
        assert_eq!(response.usage.unwrap().total_tokens, 11);
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_quota_exceeded() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limit reached")
            .create_async()
            .await;

        let model = OpenAIModel::with_api_key("gpt-4o-mini".to_string(), "k".to_string())
            .with_base_url(server.url());
        let err = model.generate_text("hi", None).await.unwrap_err();
        assert!(matches!(err, ModelError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_response_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let model = OpenAIModel::with_api_key("gpt-4o-mini".to_string(), "k".to_string())
            .with_base_url(server.url());
        let err = model.generate_text("hi", None).await.unwrap_err();
        assert!(matches!(err, ModelError::ModelResponseError(msg) if msg.contains("500")));
    }
}
