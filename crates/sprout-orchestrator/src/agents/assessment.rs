//! Assessment agent: scores each interaction.
//!
//! Scoring is a keyword/length heuristic. It looks at correctness, confusion
//! and frustration phrases, message length, response time and enthusiasm
//! markers.

use crate::agent::{Agent, AgentContext, AgentHealthStatus, HealthTracker};
use crate::messages::{AgentMessage, AgentResponse, MessagePayload, ResponsePayload};
use crate::state::{Assessment, InteractionKind, LearningState, StudentInteraction};
use crate::types::AgentType;
use async_trait::async_trait;
use tracing::debug;

const CONFUSION_PHRASES: [&str; 7] = [
    "don't understand",
    "dont understand",
    "don't get",
    "dont get",
    "confused",
    "what does",
    "huh",
];

const FRUSTRATION_PHRASES: [&str; 8] =
    ["give up", "stupid", "hate", "boring", "too hard", "ugh", "i can't", "i cant"];

const ENTHUSIASM_MARKERS: [&str; 7] = ["!", "cool", "awesome", "fun", "love", "yay", "wow"];

/// Response time after which engagement is considered to be dropping.
const SLOW_RESPONSE_MS: u64 = 60_000;

/// Frustration above which an intervention is requested outright.
const INTERVENTION_FRUSTRATION: f64 = 0.7;

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

/// Scores one interaction against the learner's current state.
#[must_use]
pub fn score_interaction(interaction: &StudentInteraction, state: &LearningState) -> Assessment {
    let text = interaction.content.to_lowercase();
    let confused = contains_any(&text, &CONFUSION_PHRASES);
    let frustrated = contains_any(&text, &FRUSTRATION_PHRASES);
    let enthusiastic = contains_any(&text, &ENTHUSIASM_MARKERS);
    let incorrect = interaction.correct == Some(false);

    let mut comprehension: f64 = match interaction.correct {
        Some(true) => 0.9,
        Some(false) => 0.3,
        None => 0.6,
    };
    if confused {
        comprehension -= 0.3;
    }

    let words = text.split_whitespace().count();
    let mut engagement: f64 = match words {
        0..=2 => 0.4,
        3..=7 => 0.6,
        _ => 0.8,
    };
    if enthusiastic {
        engagement += 0.15;
    }
    if interaction.kind == InteractionKind::Question {
        engagement += 0.05;
    }
    if interaction.response_time_ms.is_some_and(|ms| ms > SLOW_RESPONSE_MS) {
        engagement -= 0.2;
    }

    let mut frustration = state.engagement.frustration_level * 0.5;
    if frustrated {
        frustration += 0.5;
    }
    if incorrect {
        frustration += 0.2;
    }
    if confused {
        frustration += 0.1;
    }

    let mut assessment = Assessment {
        comprehension: comprehension.clamp(0.0, 1.0),
        engagement: engagement.clamp(0.0, 1.0),
        frustration: frustration.clamp(0.0, 1.0),
        ..Assessment::default()
    };

    if let Some(topic) = &interaction.topic {
        assessment.concepts_demonstrated.push(topic.clone());
        if incorrect {
            assessment.misconceptions.push(topic.clone());
        }
    }

    let repeated_gap = incorrect
        && interaction.topic.as_ref().is_some_and(|t| state.concept_map.gaps.contains(t));
    assessment.needs_intervention = assessment.frustration > INTERVENTION_FRUSTRATION || repeated_gap;
    assessment
}

/// Scores interactions for the orchestrator's assess stage.
#[derive(Debug)]
pub struct AssessmentAgent {
    health: HealthTracker,
}

impl AssessmentAgent {
    /// Creates a new assessment agent.
    #[must_use]
    pub fn new() -> Self {
        Self { health: HealthTracker::new(AgentType::Assessment) }
    }
}

impl Default for AssessmentAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for AssessmentAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Assessment
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.health.mark_started();
        Ok(())
    }

    async fn handle_message(&self, message: &AgentMessage, _ctx: AgentContext<'_>) -> AgentResponse {
        let MessagePayload::AssessInteraction { learner_id, interaction, state } = &message.payload else {
            return AgentResponse::ack();
        };

        let assessment = score_interaction(interaction, state);
        debug!(
            learner_id = %learner_id,
            comprehension = assessment.comprehension,
            engagement = assessment.engagement,
            frustration = assessment.frustration,
            "Interaction assessed"
        );
        self.health.record_success();
        AgentResponse::ok(ResponsePayload::Assessment(assessment))
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.health.mark_stopped();
        Ok(())
    }

    fn health_status(&self) -> AgentHealthStatus {
        self.health.status()
    }
}
