//! Communication agent: writes the conversational reply to the learner.

use crate::agent::{Agent, AgentContext, AgentHealthStatus, HealthTracker};
use crate::messages::{AgentMessage, AgentResponse, MessagePayload, ResponsePayload};
use crate::state::{LearningState, StudentInteraction};
use crate::types::{AgentType, Priority, Recommendation, RecommendationCategory};
use async_trait::async_trait;
use serde_json::json;
use sprout_abstraction::{ChatMessage, Model, ModelParameters};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Earlier exchanges replayed to the model.
const REPLAYED_EXCHANGES: usize = 3;

/// Builds the chat transcript sent to the model.
#[must_use]
pub fn build_conversation(interaction: &StudentInteraction, state: &LearningState) -> Vec<ChatMessage> {
    let profile = &state.profile;
    let interests = if profile.interests.is_empty() {
        String::new()
    } else {
        format!(" {} enjoys {}.", profile.name, profile.interests.join(", "))
    };
    let system = format!(
        "You are Sprout, a warm and patient tutor talking with {name}, who is {age} years old. \
         Use short sentences and simple words, and end with a gentle question.{interests}",
        name = profile.name,
        age = profile.age,
    );

    let mut conversation = vec![ChatMessage::system(system)];
    let skip = state.context_history.len().saturating_sub(REPLAYED_EXCHANGES);
    for entry in state.context_history.iter().skip(skip) {
        conversation.push(ChatMessage::user(entry.learner_message.clone()));
        conversation.push(ChatMessage::assistant(entry.response.clone()));
    }
    conversation.push(ChatMessage::user(interaction.content.clone()));
    conversation
}

/// Produces the reply recommendation for each interaction.
pub struct CommunicationAgent {
    model: Arc<dyn Model>,
    health: HealthTracker,
}

impl fmt::Debug for CommunicationAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommunicationAgent")
            .field("model_id", &self.model.model_id())
            .field("health", &self.health)
            .finish()
    }
}

impl CommunicationAgent {
    /// Creates a new communication agent.
    ///
    /// # Arguments
    /// * `model` - Completion service used to write replies
    #[must_use]
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model, health: HealthTracker::new(AgentType::Communication) }
    }
}

#[async_trait]
impl Agent for CommunicationAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Communication
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.health.mark_started();
        Ok(())
    }

    async fn handle_message(&self, message: &AgentMessage, _ctx: AgentContext<'_>) -> AgentResponse {
        let MessagePayload::RecommendationRequest { learner_id, interaction, state, .. } = &message.payload
        else {
            return AgentResponse::ack();
        };

        let conversation = build_conversation(interaction, state);
        let parameters =
            ModelParameters { temperature: Some(0.7), max_tokens: Some(160), ..ModelParameters::default() };

        match self.model.generate_chat_completion(&conversation, Some(parameters)).await {
            Ok(reply) => {
                self.health.record_success();
                debug!(learner_id = %learner_id, reply_len = reply.content.len(), "Reply generated");
                let recommendation = Recommendation::new(
                    RecommendationCategory::Content,
                    Priority::High,
                    "reply to learner",
                    0.8,
                )
                .with_data(json!({ "text": reply.content }));
                AgentResponse::ok(ResponsePayload::Recommendations(vec![recommendation]))
            }
            Err(e) => {
                let failures = self.health.record_failure();
                warn!(learner_id = %learner_id, error = %e, consecutive_failures = failures, "Reply generation failed");
                AgentResponse::failure(format!("completion failed: {e}"))
            }
        }
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.health.mark_stopped();
        Ok(())
    }

    fn health_status(&self) -> AgentHealthStatus {
        self.health.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::state::{Assessment, ContextEntry, LearnerProfile};
    use crate::types::{Participant, Recipient};
    use chrono::Utc;
    use sprout_abstraction::ModelError;
    use sprout_models::MockModel;
    use tokio_util::sync::CancellationToken;

    fn request(state: LearningState) -> AgentMessage {
        AgentMessage::new(
            Participant::Orchestrator,
            Recipient::Agent(AgentType::Communication),
            MessagePayload::RecommendationRequest {
                learner_id: "kid".into(),
                interaction: StudentInteraction::chat("why is the sky blue?"),
                assessment: Assessment::default(),
                state: Box::new(state),
            },
            Priority::High,
        )
    }

    #[test]
    fn test_conversation_replays_recent_history() {
        let mut state = LearningState::new("kid", LearnerProfile::new("Mia", 8).with_interests(["space"]));
        for i in 0..5 {
            state.context_history.push_back(ContextEntry {
                timestamp: Utc::now(),
                learner_message: format!("q{i}"),
                response: format!("a{i}"),
            });
        }
        let conversation = build_conversation(&StudentInteraction::chat("hello"), &state);

        assert_eq!(conversation.len(), 1 + 2 * REPLAYED_EXCHANGES + 1);
        assert!(conversation[0].content.contains("Mia"));
        assert!(conversation[0].content.contains("space"));
        assert_eq!(conversation[1].content, "q2");
        assert_eq!(conversation.last().unwrap().content, "hello");
    }

    #[tokio::test]
    async fn test_reply_recommendation() {
        let agent = CommunicationAgent::new(Arc::new(MockModel::new("mock".into()).with_reply("Great question!")));
        let bus = MessageBus::default();
        let state = LearningState::new("kid", LearnerProfile::new("Mia", 8));

        let response = agent
            .handle_message(&request(state), AgentContext { bus: &bus, cancel: CancellationToken::new() })
            .await;

        let Some(ResponsePayload::Recommendations(recs)) = response.payload else {
            panic!("expected recommendations");
        };
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[0].data["text"], "Great question!");
    }

    #[tokio::test]
    async fn test_model_failure_is_a_failed_response() {
        let model = MockModel::new("mock".into()).failing(ModelError::RequestError("offline".into()));
        let agent = CommunicationAgent::new(Arc::new(model));
        agent.start().await.unwrap();
        let bus = MessageBus::default();
        let state = LearningState::new("kid", LearnerProfile::new("Mia", 8));

        let response = agent
            .handle_message(&request(state), AgentContext { bus: &bus, cancel: CancellationToken::new() })
            .await;

        assert!(!response.success);
        assert!(response.error.unwrap().contains("offline"));
        assert_eq!(agent.health_status().consecutive_failures, 1);
    }
}
