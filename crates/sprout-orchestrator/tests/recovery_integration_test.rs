//! End-to-end failure recovery through a running engine.

use async_trait::async_trait;
use sprout_orchestrator::orchestrator::DEFAULT_RESPONSE;
use sprout_orchestrator::testing::ScriptedAgent;
use sprout_orchestrator::{
    AgentType, Engine, EngineConfig, FailoverHook, FailoverOutcome, LearnerProfile, RecoveryState,
    StudentInteraction,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_failing_assessment_degrades_and_falls_back() {
    let assessment = Arc::new(ScriptedAgent::new(AgentType::Assessment).failing_start().failing_messages());
    let engine = Engine::builder(EngineConfig::default())
        .with_agent(Arc::clone(&assessment) as Arc<dyn sprout_orchestrator::Agent>)
        .build()
        .await
        .unwrap();
    engine.start().await.unwrap();

    // Three restarts, five seconds apart; the first health poll is at 30 s.
    tokio::time::sleep(Duration::from_secs(20)).await;
    engine.supervisor().settle().await;

    let supervisor = engine.supervisor();
    assert_eq!(supervisor.recovery_state(AgentType::Assessment).await, RecoveryState::Degraded);
    assert_eq!(assessment.start_count(), 4);
    assert_eq!(supervisor.active_fallback(AgentType::Assessment).await.unwrap().mode, "basic_assessment");

    let orchestrator = engine.orchestrator();
    orchestrator.initialize_learning_state("zoe", LearnerProfile::new("Zoe", 6)).await;
    let result = orchestrator
        .process_student_interaction("zoe", StudentInteraction::answer("seven", true).with_topic("addition"))
        .await;
    assert_eq!(result.response, DEFAULT_RESPONSE);
    let state = orchestrator.learning_state("zoe").await.unwrap();
    assert!((state.concept_map.mastery_of("addition") - 0.8).abs() < 1e-9);

    assert!(supervisor.reset(AgentType::Assessment).await);
    assert_eq!(supervisor.recovery_state(AgentType::Assessment).await, RecoveryState::Healthy);
    assert!(!engine.bus().registry().is_degraded(AgentType::Assessment).await);

    engine.stop().await;
    engine.stop().await;
}

#[derive(Debug, Default)]
struct CountingFailover {
    calls: AtomicU32,
}

#[async_trait]
impl FailoverHook for CountingFailover {
    async fn failover(&self, _agent: AgentType) -> FailoverOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        FailoverOutcome::Recovered
    }
}

#[tokio::test(start_paused = true)]
async fn test_failover_hook_prevents_degradation() {
    let hook = Arc::new(CountingFailover::default());
    let engine = Engine::builder(EngineConfig::default())
        .with_agent(Arc::new(ScriptedAgent::new(AgentType::Game).failing_start()))
        .with_failover_hook(Arc::clone(&hook) as Arc<dyn FailoverHook>)
        .build()
        .await
        .unwrap();
    engine.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    engine.supervisor().settle().await;

    assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.supervisor().recovery_state(AgentType::Game).await, RecoveryState::Healthy);
    assert!(!engine.bus().registry().is_degraded(AgentType::Game).await);

    engine.stop().await;
}
