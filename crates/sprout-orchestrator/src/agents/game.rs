//! Game agent: suggests a learning game every few interactions.

use super::InteractionCounter;
use crate::agent::{Agent, AgentContext, AgentHealthStatus, HealthTracker};
use crate::messages::{
    AgentMessage, AgentResponse, EventKind, EventPayload, MessagePayload, NoticeTopic, ResponsePayload,
};
use crate::types::{AgentType, Participant, Priority, Recipient, Recommendation, RecommendationCategory};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Interactions between game suggestions.
pub const GAME_EVERY: u32 = 5;

const LOW_ENGAGEMENT: f64 = 0.5;

/// Watches `state-updated` and suggests games.
#[derive(Debug)]
pub struct GameAgent {
    health: HealthTracker,
    interactions: InteractionCounter,
}

impl GameAgent {
    /// Creates a new game agent.
    #[must_use]
    pub fn new() -> Self {
        Self { health: HealthTracker::new(AgentType::Game), interactions: InteractionCounter::default() }
    }

    /// Interactions seen for `learner_id`.
    pub fn interactions_seen(&self, learner_id: &str) -> u32 {
        self.interactions.get(learner_id)
    }
}

impl Default for GameAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for GameAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Game
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.health.mark_started();
        Ok(())
    }

    async fn handle_message(&self, message: &AgentMessage, ctx: AgentContext<'_>) -> AgentResponse {
        self.health.record_success();
        match &message.payload {
            MessagePayload::Event(event) => {
                let EventPayload::StateUpdated { learner_id, .. } = &event.payload else {
                    return AgentResponse::ack();
                };
                let count = self.interactions.bump(learner_id);
                if count % GAME_EVERY == 0 {
                    debug!(learner_id = %learner_id, count, "Suggesting a game");
                    ctx.bus
                        .route(AgentMessage::new(
                            Participant::Agent(AgentType::Game),
                            Recipient::Orchestrator,
                            MessagePayload::Notice {
                                learner_id: learner_id.clone(),
                                topic: NoticeTopic::GameSuggestion,
                                detail: format!("{count} interactions, time for a quick game"),
                            },
                            Priority::Low,
                        ))
                        .await;
                }
                AgentResponse::ack()
            }
            // Not part of the orchestrator's fan-out; answers callers that
            // ask directly through `MessageBus::request` or `route`.
            MessagePayload::RecommendationRequest { assessment, .. } => {
                let recommendations = if assessment.engagement < LOW_ENGAGEMENT {
                    vec![
                        Recommendation::new(
                            RecommendationCategory::Engagement,
                            Priority::Medium,
                            "play a learning game",
                            0.65,
                        )
                        .with_data(json!({ "action": "suggest-game" })),
                    ]
                } else {
                    Vec::new()
                };
                AgentResponse::ok(ResponsePayload::Recommendations(recommendations))
            }
            _ => AgentResponse::ack(),
        }
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.health.mark_stopped();
        Ok(())
    }

    fn health_status(&self) -> AgentHealthStatus {
        self.health.status()
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        vec![EventKind::StateUpdated]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::messages::AgentEvent;
    use crate::state::{Assessment, LearnerProfile, LearningState, StudentInteraction};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn state_updated(learner_id: &str) -> AgentMessage {
        let event = AgentEvent::new(
            Participant::Orchestrator,
            EventPayload::StateUpdated { learner_id: learner_id.into(), session_id: "s".into() },
            Priority::Medium,
        );
        AgentMessage::new(
            Participant::Orchestrator,
            Recipient::Agent(AgentType::Game),
            MessagePayload::Event(event),
            Priority::Medium,
        )
    }

    #[tokio::test]
    async fn test_suggests_game_every_fifth_interaction() {
        let agent = GameAgent::new();
        let bus = MessageBus::default();

        for _ in 0..(GAME_EVERY - 1) {
            agent
                .handle_message(&state_updated("kid"), AgentContext { bus: &bus, cancel: CancellationToken::new() })
                .await;
        }
        assert_eq!(bus.pending().await, (0, 0));

        agent
            .handle_message(&state_updated("kid"), AgentContext { bus: &bus, cancel: CancellationToken::new() })
            .await;
        assert_eq!(bus.pending().await, (0, 1));
        assert_eq!(agent.interactions_seen("kid"), GAME_EVERY);
        assert_eq!(agent.interactions_seen("other"), 0);
    }

    fn recommendation_request(engagement: f64) -> AgentMessage {
        AgentMessage::new(
            Participant::Orchestrator,
            Recipient::Agent(AgentType::Game),
            MessagePayload::RecommendationRequest {
                learner_id: "kid".into(),
                interaction: StudentInteraction::chat("ok"),
                assessment: Assessment { engagement, ..Assessment::default() },
                state: Box::new(LearningState::new("kid", LearnerProfile::new("Kid", 7))),
            },
            Priority::Medium,
        )
    }

    #[tokio::test]
    async fn test_direct_request_recommends_game_when_engagement_is_low() {
        let bus = MessageBus::default();
        bus.register_agent(Arc::new(GameAgent::new())).await.unwrap();

        let response = bus.request(recommendation_request(0.2), Duration::from_secs(1)).await.unwrap();
        let Some(ResponsePayload::Recommendations(recommendations)) = response.payload else {
            panic!("expected recommendations");
        };
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].category, RecommendationCategory::Engagement);
        assert_eq!(recommendations[0].data, json!({ "action": "suggest-game" }));

        let response = bus.request(recommendation_request(0.8), Duration::from_secs(1)).await.unwrap();
        assert!(matches!(response.payload, Some(ResponsePayload::Recommendations(r)) if r.is_empty()));
    }

    #[test]
    fn test_subscribes_to_state_updates() {
        assert_eq!(GameAgent::new().subscriptions(), vec![EventKind::StateUpdated]);
    }
}
