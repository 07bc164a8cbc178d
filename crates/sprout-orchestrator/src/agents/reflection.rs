//! Reflection agent: periodically asks the learner to look back.

use super::InteractionCounter;
use crate::agent::{Agent, AgentContext, AgentHealthStatus, HealthTracker};
use crate::messages::{AgentMessage, AgentResponse, EventKind, EventPayload, MessagePayload, NoticeTopic};
use crate::types::{AgentType, Participant, Priority, Recipient};
use async_trait::async_trait;
use tracing::debug;

/// Interactions between reflection prompts.
pub const REFLECT_EVERY: u32 = 10;

/// Watches `state-updated` and routes reflection prompts.
#[derive(Debug)]
pub struct ReflectionAgent {
    health: HealthTracker,
    interactions: InteractionCounter,
}

impl ReflectionAgent {
    /// Creates a new reflection agent.
    #[must_use]
    pub fn new() -> Self {
        Self { health: HealthTracker::new(AgentType::Reflection), interactions: InteractionCounter::default() }
    }
}

impl Default for ReflectionAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ReflectionAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Reflection
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.health.mark_started();
        Ok(())
    }

    async fn handle_message(&self, message: &AgentMessage, ctx: AgentContext<'_>) -> AgentResponse {
        self.health.record_success();
        let MessagePayload::Event(event) = &message.payload else {
            return AgentResponse::ack();
        };
        let EventPayload::StateUpdated { learner_id, .. } = &event.payload else {
            return AgentResponse::ack();
        };

        let count = self.interactions.bump(learner_id);
        if count % REFLECT_EVERY == 0 {
            debug!(learner_id = %learner_id, count, "Prompting reflection");
            ctx.bus
                .route(AgentMessage::new(
                    Participant::Agent(AgentType::Reflection),
                    Recipient::Orchestrator,
                    MessagePayload::Notice {
                        learner_id: learner_id.clone(),
                        topic: NoticeTopic::ReflectionPrompt,
                        detail: "What was the most interesting thing you learned so far?".to_string(),
                    },
                    Priority::Low,
                ))
                .await;
        }
        AgentResponse::ack()
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
