//! Path-planning agent: orders concepts by mastery and tunes difficulty.

use crate::agent::{Agent, AgentContext, AgentHealthStatus, HealthTracker};
use crate::messages::{AgentMessage, AgentResponse, MessagePayload, ResponsePayload};
use crate::state::{Assessment, LearningState};
use crate::types::{AgentType, Priority, Recommendation, RecommendationCategory};
use async_trait::async_trait;
use serde_json::json;

/// Mastery at which a concept counts as learned.
pub const MASTERED_AT: f64 = 0.8;

const RAISE_DIFFICULTY_ABOVE: f64 = 0.85;
const LOWER_DIFFICULTY_BELOW: f64 = 0.35;
const DIFFICULTY_STEP_UP: f64 = 0.1;
const DIFFICULTY_STEP_DOWN: f64 = 0.15;

/// Builds path-planning recommendations for the given state.
#[must_use]
pub fn plan(assessment: &Assessment, state: &LearningState) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    let unmastered_objective = state
        .objectives
        .iter()
        .chain(state.learning_path.iter())
        .find(|concept| state.concept_map.mastery_of(concept) < MASTERED_AT)
        .cloned();
    let ordered = state.concept_map.by_mastery();
    let next = unmastered_objective.or_else(|| {
        ordered.iter().find(|(_, mastery)| *mastery < MASTERED_AT).map(|(c, _)| (*c).to_string())
    });

    if let Some(next) = next {
        let path: Vec<&str> = ordered.iter().map(|(concept, _)| *concept).collect();
        recommendations.push(
            Recommendation::new(
                RecommendationCategory::Strategy,
                Priority::Medium,
                format!("focus on {next}"),
                0.6,
            )
            .with_data(json!({ "next_concept": next, "ordered_concepts": path })),
        );
    }

    if assessment.comprehension > RAISE_DIFFICULTY_ABOVE && state.difficulty_level < 1.0 {
        recommendations.push(
            Recommendation::new(
                RecommendationCategory::Difficulty,
                Priority::Medium,
                "increase difficulty",
                0.7,
            )
            .with_data(json!({ "difficulty": (state.difficulty_level + DIFFICULTY_STEP_UP).min(1.0) })),
        );
    } else if assessment.comprehension < LOWER_DIFFICULTY_BELOW && state.difficulty_level > 0.0 {
        recommendations.push(
            Recommendation::new(
                RecommendationCategory::Difficulty,
                Priority::High,
                "decrease difficulty",
                0.75,
            )
            .with_data(json!({ "difficulty": (state.difficulty_level - DIFFICULTY_STEP_DOWN).max(0.0) })),
        );
    }

    recommendations
}

/// Recommends the next concept and difficulty changes.
#[derive(Debug)]
pub struct PathPlanningAgent {
    health: HealthTracker,
}

impl PathPlanningAgent {
    /// Creates a new path-planning agent.
    #[must_use]
    pub fn new() -> Self {
        Self { health: HealthTracker::new(AgentType::PathPlanning) }
    }
}

impl Default for PathPlanningAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for PathPlanningAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::PathPlanning
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.health.mark_started();
        Ok(())
    }

    async fn handle_message(&self, message: &AgentMessage, _ctx: AgentContext<'_>) -> AgentResponse {
        match &message.payload {
            MessagePayload::RecommendationRequest { assessment, state, .. } => {
                self.health.record_success();
                AgentResponse::ok(ResponsePayload::Recommendations(plan(assessment, state)))
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
