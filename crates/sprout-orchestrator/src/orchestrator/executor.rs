//! Decision execution.
//!
//! Each decision goes to the executor for its category. Outcomes accumulate:
//! the last non-empty response wins, action tags are unioned in first-seen
//! order, and state patches merge.

use crate::state::StatePatch;
use crate::types::{Decision, RecommendationCategory};
use tracing::debug;

/// Reply used when no executor produced one.
pub const DEFAULT_RESPONSE: &str =
    "That's a great thought! Let's keep exploring together. What would you like to try next?";

/// What executing one or more decisions produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    /// Text to show the learner.
    pub response: Option<String>,
    /// UI action tags.
    pub actions: Vec<String>,
    /// Changes to persist.
    pub patch: StatePatch,
}

impl ExecutionOutcome {
    fn push_action(&mut self, action: impl Into<String>) {
        let action = action.into();
        if !self.actions.contains(&action) {
            self.actions.push(action);
        }
    }

    /// Folds `other` into `self`.
    pub fn absorb(&mut self, other: Self) {
        if let Some(response) = other.response.filter(|r| !r.trim().is_empty()) {
            self.response = Some(response);
        }
        for action in other.actions {
            self.push_action(action);
        }
        self.patch.merge(other.patch);
    }

    /// The response, or the default encouraging reply.
    #[must_use]
    pub fn response_or_default(&self) -> String {
        self.response.clone().unwrap_or_else(|| DEFAULT_RESPONSE.to_string())
    }
}

/// Executes decisions of one or more categories.
pub trait DecisionExecutor: Send + Sync {
    /// Executes one decision.
    fn execute(&self, decision: &Decision) -> ExecutionOutcome;
}

fn text_of(decision: &Decision) -> Option<String> {
    decision.data.get("text").and_then(serde_json::Value::as_str).map(str::to_string)
}

/// Turns content decisions into the learner-facing reply.
#[derive(Debug, Default)]
pub struct ContentExecutor;

impl DecisionExecutor for ContentExecutor {
    fn execute(&self, decision: &Decision) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome { response: text_of(decision), ..ExecutionOutcome::default() };
        if let Some(concept) = decision.data.get("concept").and_then(serde_json::Value::as_str) {
            outcome.patch.path_additions.push(concept.to_string());
            outcome.push_action("show-explanation");
        }
        outcome
    }
}

/// Turns interventions into encouragement or a break.
#[derive(Debug, Default)]
pub struct InterventionExecutor;

impl DecisionExecutor for InterventionExecutor {
    fn execute(&self, decision: &Decision) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome { response: text_of(decision), ..ExecutionOutcome::default() };
        match decision.data.get("kind").and_then(serde_json::Value::as_str) {
            Some("break") => outcome.push_action("suggest-break"),
            _ => outcome.push_action("show-encouragement"),
        }
        outcome
    }
}

/// Applies path, difficulty and engagement decisions to the state.
#[derive(Debug, Default)]
pub struct StrategyExecutor;

impl DecisionExecutor for StrategyExecutor {
    fn execute(&self, decision: &Decision) -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome::default();
        match decision.category {
            RecommendationCategory::Difficulty => {
                if let Some(level) = decision.data.get("difficulty").and_then(serde_json::Value::as_f64) {
                    outcome.patch.difficulty = Some(level);
                    outcome.push_action("adjust-difficulty");
                }
            }
            RecommendationCategory::Engagement => {
                let action = decision.data.get("action").and_then(serde_json::Value::as_str);
                outcome.push_action(action.unwrap_or("boost-engagement"));
            }
            _ => {
                if let Some(next) = decision.data.get("next_concept").and_then(serde_json::Value::as_str) {
                    outcome.patch.path_additions.push(next.to_string());
                    outcome.push_action("update-path");
                }
            }
        }
        outcome
    }
}

/// Routes decisions to the executor for their category.
#[derive(Debug, Default)]
pub struct ExecutorSet {
    content: ContentExecutor,
    intervention: InterventionExecutor,
    strategy: StrategyExecutor,
}

impl ExecutorSet {
    /// Creates the default executors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes every decision in order and accumulates the outcomes.
    #[must_use]
    pub fn execute_all(&self, decisions: &[Decision]) -> ExecutionOutcome {
        let mut total = ExecutionOutcome::default();
        for decision in decisions {
            let outcome = match decision.category {
                RecommendationCategory::Content => self.content.execute(decision),
                RecommendationCategory::Intervention => self.intervention.execute(decision),
                RecommendationCategory::Strategy
                | RecommendationCategory::Difficulty
                | RecommendationCategory::Engagement => self.strategy.execute(decision),
                RecommendationCategory::Action => {
                    let mut outcome = ExecutionOutcome::default();
                    outcome.push_action(decision.action.clone());
                    outcome
                }
            };
            debug!(
                category = decision.category.as_str(),
                action = %decision.action,
                produced_response = outcome.response.is_some(),
                "Decision executed"
            );
            total.absorb(outcome);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Priority, Recommendation};
    use serde_json::json;

    fn decision(category: RecommendationCategory, action: &str, data: serde_json::Value) -> Decision {
        Decision::from_recommendation(&Recommendation::new(category, Priority::Medium, action, 0.8).with_data(data))
    }

    #[test]
    fn test_last_non_empty_response_wins() {
        let decisions = vec![
            decision(RecommendationCategory::Content, "reply", json!({ "text": "first" })),
            decision(RecommendationCategory::Intervention, "cheer", json!({ "text": "second", "kind": "encouragement" })),
            decision(RecommendationCategory::Content, "blank", json!({ "text": "  " })),
        ];
        let outcome = ExecutorSet::new().execute_all(&decisions);
        assert_eq!(outcome.response.as_deref(), Some("second"));
        assert_eq!(outcome.actions, vec!["show-encouragement".to_string()]);
    }

    #[test]
    fn test_actions_union_in_first_seen_order() {
        let decisions = vec![
            decision(RecommendationCategory::Action, "show-break-timer", json!(null)),
            decision(RecommendationCategory::Intervention, "rest", json!({ "kind": "break" })),
            decision(RecommendationCategory::Action, "show-break-timer", json!(null)),
        ];
        let outcome = ExecutorSet::new().execute_all(&decisions);
        assert_eq!(outcome.actions, vec!["show-break-timer".to_string(), "suggest-break".to_string()]);
        assert_eq!(outcome.response_or_default(), DEFAULT_RESPONSE);
    }

    #[test]
    fn test_strategy_decisions_patch_state() {
        let decisions = vec![
            decision(RecommendationCategory::Strategy, "focus on decimals", json!({ "next_concept": "decimals" })),
            decision(RecommendationCategory::Difficulty, "increase difficulty", json!({ "difficulty": 0.6 })),
            decision(RecommendationCategory::Engagement, "play", json!({ "action": "suggest-game" })),
        ];
        let outcome = ExecutorSet::new().execute_all(&decisions);

        assert_eq!(outcome.patch.path_additions, vec!["decimals".to_string()]);
        assert_eq!(outcome.patch.difficulty, Some(0.6));
        assert_eq!(
            outcome.actions,
            vec!["update-path".to_string(), "adjust-difficulty".to_string(), "suggest-game".to_string()]
        );
        assert!(outcome.response.is_none());
    }
}
