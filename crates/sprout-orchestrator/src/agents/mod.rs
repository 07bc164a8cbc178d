//! The seven tutoring agents.
//!
//! Assessment, path planning and intervention are pure heuristics. Content
//! generation and communication call the completion service. Game and
//! reflection watch `state-updated` events and nudge the orchestrator.

pub mod assessment;
pub mod communication;
pub mod content_generation;
pub mod game;
pub mod intervention;
pub mod path_planning;
pub mod reflection;

pub use assessment::AssessmentAgent;
pub use communication::CommunicationAgent;
pub use content_generation::ContentGenerationAgent;
pub use game::GameAgent;
pub use intervention::InterventionAgent;
pub use path_planning::PathPlanningAgent;
pub use reflection::ReflectionAgent;

use crate::agent::Agent;
use sprout_abstraction::Model;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Builds one of each agent, in the order the orchestrator starts them.
///
/// # Arguments
/// * `model` - Completion service shared by the agents that generate text
#[must_use]
pub fn default_agents(model: Arc<dyn Model>) -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(AssessmentAgent::new()),
        Arc::new(PathPlanningAgent::new()),
        Arc::new(ContentGenerationAgent::new(Arc::clone(&model))),
        Arc::new(InterventionAgent::new()),
        Arc::new(CommunicationAgent::new(model)),
        Arc::new(GameAgent::new()),
        Arc::new(ReflectionAgent::new()),
    ]
}

/// Per-learner interaction counter for the periodic agents.
#[derive(Debug, Default)]
pub(crate) struct InteractionCounter {
    counts: Mutex<HashMap<String, u32>>,
}

impl InteractionCounter {
    /// Bumps the learner's count and returns the new value.
    pub(crate) fn bump(&self, learner_id: &str) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(learner_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub(crate) fn get(&self, learner_id: &str) -> u32 {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner).get(learner_id).copied().unwrap_or(0)
    }
}
