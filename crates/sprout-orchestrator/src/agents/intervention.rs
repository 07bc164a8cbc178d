//! Intervention agent: steps in when a learner is frustrated or drifting.

use crate::agent::{Agent, AgentContext, AgentHealthStatus, HealthTracker};
use crate::messages::{AgentEvent, AgentMessage, AgentResponse, EventPayload, MessagePayload, ResponsePayload};
use crate::state::{Assessment, LearningState};
use crate::types::{AgentType, Participant, Priority, Recommendation, RecommendationCategory};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

const FRUSTRATION_LIMIT: f64 = 0.6;
const ENGAGEMENT_FLOOR: f64 = 0.3;

const ENCOURAGEMENT: &str = "You're doing great by sticking with this. Let's try it together, one small step at a time!";
const BREAK_SUGGESTION: &str = "You've been working hard! How about a quick stretch before we keep going?";

/// Why an intervention fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterventionReason {
    /// Frustration above the limit.
    Frustration,
    /// Engagement below the floor.
    LowEngagement,
    /// The assessment asked for help.
    Requested,
}

impl InterventionReason {
    /// Returns a short label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Frustration => "high frustration",
            Self::LowEngagement => "low engagement",
            Self::Requested => "assessment requested help",
        }
    }
}

/// Returns the reason to intervene, if any. Frustration wins over engagement.
#[must_use]
pub fn intervention_reason(assessment: &Assessment, state: &LearningState) -> Option<InterventionReason> {
    let frustration = assessment.frustration.max(state.engagement.frustration_level);
    if frustration > FRUSTRATION_LIMIT {
        Some(InterventionReason::Frustration)
    } else if assessment.engagement < ENGAGEMENT_FLOOR {
        Some(InterventionReason::LowEngagement)
    } else if assessment.needs_intervention {
        Some(InterventionReason::Requested)
    } else {
        None
    }
}

/// Builds the recommendations for `reason`.
#[must_use]
pub fn recommendations_for(reason: InterventionReason) -> Vec<Recommendation> {
    match reason {
        InterventionReason::Frustration => vec![
            Recommendation::new(
                RecommendationCategory::Intervention,
                Priority::High,
                "offer encouragement",
                0.85,
            )
            .with_data(json!({ "text": ENCOURAGEMENT, "kind": "encouragement" })),
        ],
        InterventionReason::LowEngagement => vec![
            Recommendation::new(
                RecommendationCategory::Intervention,
                Priority::High,
                "suggest a short break",
                0.8,
            )
            .with_data(json!({ "text": BREAK_SUGGESTION, "kind": "break" })),
            Recommendation::new(RecommendationCategory::Action, Priority::Medium, "show-break-timer", 0.6),
        ],
        InterventionReason::Requested => vec![
            Recommendation::new(
                RecommendationCategory::Intervention,
                Priority::Medium,
                "offer encouragement",
                0.7,
            )
            .with_data(json!({ "text": ENCOURAGEMENT, "kind": "encouragement" })),
        ],
    }
}

/// Recommends encouragement or breaks and announces interventions.
#[derive(Debug)]
pub struct InterventionAgent {
    health: HealthTracker,
}

impl InterventionAgent {
    /// Creates a new intervention agent.
    #[must_use]
    pub fn new() -> Self {
        Self { health: HealthTracker::new(AgentType::Intervention) }
    }
}

impl Default for InterventionAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for InterventionAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Intervention
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.health.mark_started();
        Ok(())
    }

    async fn handle_message(&self, message: &AgentMessage, ctx: AgentContext<'_>) -> AgentResponse {
        let MessagePayload::RecommendationRequest { learner_id, assessment, state, .. } = &message.payload
        else {
            return AgentResponse::ack();
        };
        self.health.record_success();

        let Some(reason) = intervention_reason(assessment, state) else {
            return AgentResponse::ok(ResponsePayload::Recommendations(Vec::new()));
        };

        info!(learner_id = %learner_id, reason = reason.as_str(), "Intervention triggered");
        ctx.bus
            .publish(AgentEvent::new(
                Participant::Agent(AgentType::Intervention),
                EventPayload::InterventionTriggered {
                    learner_id: learner_id.clone(),
                    reason: reason.as_str().to_string(),
                },
                Priority::High,
            ))
            .await;

        AgentResponse::ok(ResponsePayload::Recommendations(recommendations_for(reason)))
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.health.mark_stopped();
        Ok(())
    }

    fn health_status(&self) -> AgentHealthStatus {
        self.health.status()
    }
}
