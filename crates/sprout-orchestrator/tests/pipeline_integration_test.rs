//! Integration tests for the interaction pipeline.

use serde_json::json;
use sprout_orchestrator::config::OrchestratorConfig;
use sprout_orchestrator::orchestrator::DEFAULT_RESPONSE;
use sprout_orchestrator::testing::ScriptedAgent;
use sprout_orchestrator::{
    Agent, AgentType, Assessment, LearnerProfile, LearningOrchestrator, MessageBus, Priority,
    Recommendation, RecommendationCategory, ResponsePayload, StudentInteraction,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn orchestrator(strategy: &str) -> LearningOrchestrator {
    let config = OrchestratorConfig { conflict_strategy: strategy.to_string(), ..OrchestratorConfig::default() };
    LearningOrchestrator::new(Arc::new(MessageBus::default()), config).unwrap()
}

fn assessor() -> Arc<dyn Agent> {
    Arc::new(ScriptedAgent::new(AgentType::Assessment).with_reply(ResponsePayload::Assessment(Assessment::default())))
}

fn recommender(agent_type: AgentType, recommendations: Vec<Recommendation>) -> Arc<dyn Agent> {
    Arc::new(ScriptedAgent::new(agent_type).with_reply(ResponsePayload::Recommendations(recommendations)))
}

#[tokio::test]
async fn test_all_recommenders_failing_still_answers() {
    let orchestrator = orchestrator("weighted");
    orchestrator.register(assessor()).await.unwrap();
    for agent_type in AgentType::RECOMMENDERS {
        orchestrator.register(Arc::new(ScriptedAgent::new(agent_type).failing_messages())).await.unwrap();
    }
    orchestrator.initialize_learning_state("leo", LearnerProfile::new("Leo", 7)).await;

    let result = orchestrator.process_student_interaction("leo", StudentInteraction::chat("hello")).await;

    assert_eq!(result.response, DEFAULT_RESPONSE);
    assert!(result.actions.is_empty());
    // Four agent-failure events plus state-updated.
    assert_eq!(orchestrator.bus().pending().await, (5, 0));
    let state = orchestrator.learning_state("leo").await.unwrap();
    assert_eq!(state.context_history.len(), 1);
}

#[tokio::test]
async fn test_consensus_keeps_only_shared_recommendations() {
    let orchestrator = orchestrator("consensus");
    orchestrator.register(assessor()).await.unwrap();
    orchestrator
        .register(recommender(
            AgentType::PathPlanning,
            vec![
                Recommendation::new(RecommendationCategory::Content, Priority::Medium, "X", 0.8)
                    .with_data(json!({ "text": "Let's count together!" })),
            ],
        ))
        .await
        .unwrap();
    orchestrator
        .register(recommender(
            AgentType::ContentGeneration,
            vec![Recommendation::new(RecommendationCategory::Content, Priority::Medium, "X", 0.6)],
        ))
        .await
        .unwrap();
    orchestrator
        .register(recommender(
            AgentType::Intervention,
            vec![Recommendation::new(RecommendationCategory::Intervention, Priority::High, "Y", 0.9)],
        ))
        .await
        .unwrap();
    orchestrator.initialize_learning_state("leo", LearnerProfile::new("Leo", 7)).await;

    let result = orchestrator.process_student_interaction("leo", StudentInteraction::chat("1, 2, 3")).await;

    assert_eq!(result.response, "Let's count together!");
    assert!(!result.actions.iter().any(|a| a == "show-encouragement"));
}

#[tokio::test(start_paused = true)]
async fn test_same_learner_interactions_are_serialized() {
    let orchestrator = orchestrator("weighted");
    orchestrator
        .register(Arc::new(
            ScriptedAgent::new(AgentType::Assessment)
                .with_reply(ResponsePayload::Assessment(Assessment::default()))
                .with_delay(Duration::from_millis(100)),
        ))
        .await
        .unwrap();
    orchestrator.initialize_learning_state("leo", LearnerProfile::new("Leo", 7)).await;

    let started = Instant::now();
    let (first, second) = tokio::join!(
        orchestrator.process_student_interaction("leo", StudentInteraction::chat("first")),
        orchestrator.process_student_interaction("leo", StudentInteraction::chat("second")),
    );

    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(first.response, DEFAULT_RESPONSE);
    assert_eq!(second.response, DEFAULT_RESPONSE);
    let state = orchestrator.learning_state("leo").await.unwrap();
    assert_eq!(state.context_history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_different_learners_run_concurrently() {
    let orchestrator = orchestrator("weighted");
    orchestrator
        .register(Arc::new(
            ScriptedAgent::new(AgentType::Assessment)
                .with_reply(ResponsePayload::Assessment(Assessment::default()))
                .with_delay(Duration::from_millis(100)),
        ))
        .await
        .unwrap();
    orchestrator.initialize_learning_state("leo", LearnerProfile::new("Leo", 7)).await;
    orchestrator.initialize_learning_state("ava", LearnerProfile::new("Ava", 9)).await;

    let started = Instant::now();
    tokio::join!(
        orchestrator.process_student_interaction("leo", StudentInteraction::chat("hi")),
        orchestrator.process_student_interaction("ava", StudentInteraction::chat("hi")),
    );

    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(orchestrator.active_learners().await, vec!["ava".to_string(), "leo".to_string()]);
}
