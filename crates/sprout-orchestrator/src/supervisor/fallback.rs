//! Predeclared degraded-mode behavior per agent type.
//!
//! A degraded recommender is left out of the recommend stage and the
//! pipeline runs on what the others return. Degraded subscribers stop
//! receiving events. Only assessment has a local stand-in.

use crate::state::{Assessment, LearningState, StudentInteraction};
use crate::types::AgentType;
use serde::Serialize;

/// What an agent falls back to once it cannot be restarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackBehavior {
    /// Agent the fallback stands in for.
    pub agent: AgentType,
    /// Whether the fallback is in force.
    pub active: bool,
    /// Name of the degraded mode.
    pub mode: &'static str,
    /// What the degraded mode still does.
    pub description: &'static str,
    /// What is lost.
    pub limitations: &'static [&'static str],
}

/// Returns the inactive fallback for `agent`.
#[must_use]
pub const fn fallback_for(agent: AgentType) -> FallbackBehavior {
    let (mode, description, limitations): (&str, &str, &[&str]) = match agent {
        AgentType::Assessment => (
            "basic_assessment",
            "Scores answers by correctness and message length only",
            &["no confusion or frustration detection", "no misconception tracking"],
        ),
        AgentType::ContentGeneration => (
            "template_content",
            "Left out of the recommend stage; the reply comes from communication or the fixed default reply",
            &["no model-written explanations", "no concept added to the learning path"],
        ),
        AgentType::PathPlanning => (
            "linear_path",
            "Left out of the recommend stage; the learning path and difficulty stay as they are",
            &["no mastery-based reordering", "difficulty stays fixed"],
        ),
        AgentType::Intervention => (
            "basic_encouragement",
            "Left out of the recommend stage; no encouragement or break is triggered",
            &["no frustration or break detection", "no intervention-triggered events"],
        ),
        AgentType::Communication => (
            "scripted_responses",
            "Left out of the recommend stage; the reply comes from content generation or the fixed default reply",
            &["no conversational context", "no follow-up questions"],
        ),
        AgentType::Game => ("games_disabled", "No games are suggested", &["no game suggestions"]),
        AgentType::Reflection => {
            ("reflection_disabled", "No reflection prompts are sent", &["no progress reflection"])
        }
    };
    FallbackBehavior { agent, active: false, mode, description, limitations }
}

/// Local assessment used while the assessment agent is degraded.
#[must_use]
pub fn basic_assessment(interaction: &StudentInteraction, state: &LearningState) -> Assessment {
    let comprehension = match interaction.correct {
        Some(true) => 0.8,
        Some(false) => 0.4,
        None => 0.5,
    };
    let engagement = if interaction.content.split_whitespace().count() > 3 { 0.6 } else { 0.4 };

    Assessment {
        comprehension,
        engagement,
        frustration: state.engagement.frustration_level * 0.8,
        concepts_demonstrated: interaction.topic.iter().cloned().collect(),
        ..Assessment::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LearnerProfile;

    #[test]
    fn test_every_agent_has_a_fallback() {
        let modes: Vec<&str> = AgentType::ALL.iter().map(|a| fallback_for(*a).mode).collect();
        assert_eq!(
            modes,
            vec![
                "basic_assessment",
                "template_content",
                "linear_path",
                "basic_encouragement",
                "scripted_responses",
                "games_disabled",
                "reflection_disabled",
            ]
        );
        assert!(AgentType::ALL.iter().all(|a| !fallback_for(*a).limitations.is_empty()));
        assert!(AgentType::ALL.iter().all(|a| !fallback_for(*a).active));
    }

    #[test]
    fn test_basic_assessment() {
        let mut state = LearningState::new("kid", LearnerProfile::new("Kid", 9));
        state.engagement.frustration_level = 0.5;
        let answer = StudentInteraction::answer("seven", true).with_topic("addition");
        let assessment = basic_assessment(&answer, &state);

        assert!((assessment.comprehension - 0.8).abs() < 1e-9);
        assert!((assessment.engagement - 0.4).abs() < 1e-9);
        assert!((assessment.frustration - 0.4).abs() < 1e-9);
        assert_eq!(assessment.concepts_demonstrated, vec!["addition".to_string()]);
        assert!(!assessment.needs_intervention);
    }
}
