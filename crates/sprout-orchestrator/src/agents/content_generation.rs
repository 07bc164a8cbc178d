//! Content-generation agent: asks the completion service for a short,
//! age-appropriate explanation.

use crate::agent::{Agent, AgentContext, AgentHealthStatus, HealthTracker};
use crate::messages::{AgentMessage, AgentResponse, MessagePayload, ResponsePayload};
use crate::state::{Assessment, LearningState, StudentInteraction};
use crate::types::{AgentType, Priority, Recommendation, RecommendationCategory};
use async_trait::async_trait;
use serde_json::json;
use sprout_abstraction::{Model, ModelParameters};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Picks what to explain: the interaction topic, then the weakest concept,
/// then the first objective.
fn pick_concept(interaction: &StudentInteraction, state: &LearningState) -> Option<String> {
    interaction
        .topic
        .clone()
        .or_else(|| state.concept_map.weakest().map(|(concept, _)| concept.to_string()))
        .or_else(|| state.objectives.first().cloned())
}

/// Produces explanatory content recommendations.
pub struct ContentGenerationAgent {
    model: Arc<dyn Model>,
    health: HealthTracker,
}

impl fmt::Debug for ContentGenerationAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentGenerationAgent")
            .field("model_id", &self.model.model_id())
            .field("health", &self.health)
            .finish()
    }
}

impl ContentGenerationAgent {
    /// Creates a new content-generation agent.
    ///
    /// # Arguments
    /// * `model` - Completion service used to write explanations
    #[must_use]
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model, health: HealthTracker::new(AgentType::ContentGeneration) }
    }

    async fn recommend(
        &self,
        interaction: &StudentInteraction,
        assessment: &Assessment,
        state: &LearningState,
    ) -> AgentResponse {
        let Some(concept) = pick_concept(interaction, state) else {
            return AgentResponse::ok(ResponsePayload::Recommendations(Vec::new()));
        };

        let prompt = format!(
            "Explain {concept} to a {age}-year-old named {name} in two short, friendly sentences.",
            age = state.profile.age,
            name = state.profile.name,
        );
        let parameters = ModelParameters { max_tokens: Some(120), ..ModelParameters::default() };

        match self.model.generate_text(&prompt, Some(parameters)).await {
            Ok(response) => {
                self.health.record_success();
                let is_gap = state.concept_map.gaps.contains(&concept);
                let confidence = if is_gap || assessment.comprehension < 0.5 { 0.8 } else { 0.6 };
                debug!(concept = %concept, confidence, "Explanation generated");

                let recommendation = Recommendation::new(
                    RecommendationCategory::Content,
                    Priority::Medium,
                    format!("explain {concept}"),
                    confidence,
                )
                .with_data(json!({ "text": response.content, "concept": concept }));
                AgentResponse::ok(ResponsePayload::Recommendations(vec![recommendation]))
            }
            Err(e) => {
                self.health.record_failure();
                warn!(concept = %concept, error = %e, "Explanation generation failed");
                AgentResponse::failure(format!("completion failed: {e}"))
            }
        }
    }
}

#[async_trait]
impl Agent for ContentGenerationAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::ContentGeneration
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.health.mark_started();
        Ok(())
    }

    async fn handle_message(&self, message: &AgentMessage, _ctx: AgentContext<'_>) -> AgentResponse {
        match &message.payload {
            MessagePayload::RecommendationRequest { interaction, assessment, state, .. } => {
                self.recommend(interaction, assessment, state).await
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LearnerProfile;

    #[test]
    fn test_pick_concept_fallbacks() {
        let mut state = LearningState::new("kid", LearnerProfile::new("Kid", 8).with_goals(["counting"]));
        let chat = StudentInteraction::chat("hello");
        assert_eq!(pick_concept(&chat, &state).as_deref(), Some("counting"));

        state.concept_map.mastery.insert("shapes".to_string(), 0.2);
        assert_eq!(pick_concept(&chat, &state).as_deref(), Some("shapes"));

        let topical = StudentInteraction::chat("hello").with_topic("fractions");
        assert_eq!(pick_concept(&topical, &state).as_deref(), Some("fractions"));
    }
}
