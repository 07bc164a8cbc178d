//! Learning orchestrator.
//!
//! Owns per-learner session state and runs each interaction through the
//! pipeline:
//!
//! 1. assess: synchronous request to the assessment agent
//! 2. recommend: parallel requests to the recommending agents
//! 3. decide: conflict resolution with the configured strategy
//! 4. execute: category executors build the reply and a state patch
//! 5. persist: the patch is applied and `state-updated` is published
//!
//! The learner's slot stays locked for the whole pipeline, so one learner's
//! interactions never interleave while other learners run in parallel.

pub mod conflict;
pub mod executor;

pub use conflict::{ConflictStrategy, weighted_score};
pub use executor::{
    ContentExecutor, DEFAULT_RESPONSE, DecisionExecutor, ExecutionOutcome, ExecutorSet,
    InterventionExecutor, StrategyExecutor,
};

use crate::agent::Agent;
use crate::bus::{BusDispatcher, MessageBus, MessageHandler};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestrationError, Result};
use crate::messages::{AgentEvent, AgentMessage, EventPayload, MessagePayload, NoticeTopic, ResponsePayload};
use crate::state::{Assessment, ContextEntry, LearnerProfile, LearningState, StatePatch, StudentInteraction};
use crate::store::LearningStateStore;
use crate::supervisor::basic_assessment;
use crate::types::{AgentType, Participant, Priority, Recipient, SourcedRecommendation};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Reply returned when the pipeline fails.
pub const APOLOGY_RESPONSE: &str =
    "I'm sorry, I got a little mixed up there. Could you try telling me that again?";

/// What the learner gets back for one interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionResult {
    /// Text to show the learner.
    pub response: String,
    /// UI action tags.
    pub actions: Vec<String>,
}

impl InteractionResult {
    /// The fixed apology with no actions.
    #[must_use]
    pub fn apology() -> Self {
        Self { response: APOLOGY_RESPONSE.to_string(), actions: Vec::new() }
    }
}

/// Action tags from agent notices, held until the learner's next reply.
#[derive(Debug, Default)]
struct NoticeBoard {
    pending: StdMutex<HashMap<String, Vec<String>>>,
}

impl NoticeBoard {
    fn post(&self, learner_id: &str, tag: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let tags = pending.entry(learner_id.to_string()).or_default();
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    fn take(&self, learner_id: &str) -> Vec<String> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).remove(learner_id).unwrap_or_default()
    }
}

/// Receives messages addressed to the orchestrator.
struct NoticeInbox {
    board: Arc<NoticeBoard>,
}

#[async_trait]
impl MessageHandler for NoticeInbox {
    async fn handle(&self, message: &AgentMessage) -> anyhow::Result<()> {
        match &message.payload {
            MessagePayload::Notice { learner_id, topic, detail } => {
                let tag = match topic {
                    NoticeTopic::GameSuggestion => "suggest-game",
                    NoticeTopic::ReflectionPrompt => "reflection-prompt",
                };
                debug!(learner_id = %learner_id, tag, detail = %detail, from = %message.from, "Notice received");
                self.board.post(learner_id, tag);
            }
            MessagePayload::Reply { in_reply_to, response } => {
                debug!(in_reply_to = %in_reply_to, success = response.success, "Late reply received");
            }
            _ => debug!(message_id = %message.id, kind = %message.kind(), "Ignoring orchestrator message"),
        }
        Ok(())
    }
}

/// Coordinates agents and owns learner state.
pub struct LearningOrchestrator {
    id: String,
    bus: Arc<MessageBus>,
    store: LearningStateStore,
    config: OrchestratorConfig,
    strategy: ConflictStrategy,
    executors: ExecutorSet,
    dispatcher: BusDispatcher,
    notices: Arc<NoticeBoard>,
    running: Mutex<bool>,
}

impl fmt::Debug for LearningOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearningOrchestrator")
            .field("id", &self.id)
            .field("strategy", &self.strategy)
            .field("store", &self.store)
            .field("running", &self.running.try_lock().map(|r| *r).unwrap_or(true))
            .finish_non_exhaustive()
    }
}

impl LearningOrchestrator {
    /// Creates a stopped orchestrator on `bus`.
    ///
    /// # Arguments
    /// * `bus` - Shared bus; agents are registered on it
    /// * `config` - Strategy and request deadline
    ///
    /// # Errors
    /// Returns `Config` if the conflict strategy name is unknown.
    pub fn new(bus: Arc<MessageBus>, config: OrchestratorConfig) -> Result<Self> {
        let strategy = config.strategy()?;
        Ok(Self {
            id: format!("orchestrator-{}", Uuid::new_v4()),
            dispatcher: BusDispatcher::new(Arc::clone(&bus)),
            bus,
            store: LearningStateStore::new(),
            config,
            strategy,
            executors: ExecutorSet::new(),
            notices: Arc::new(NoticeBoard::default()),
            running: Mutex::new(false),
        })
    }

    /// Identifier this orchestrator registers its bus inbox under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The shared bus.
    pub const fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// The conflict-resolution strategy in use.
    pub const fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Registers an agent on the bus.
    ///
    /// # Errors
    /// Returns `DuplicateAgent` if the type is already registered.
    pub async fn register(&self, agent: Arc<dyn Agent>) -> Result<()> {
        self.bus.register_agent(agent).await
    }

    /// Starts every registered agent in registration order, then the bus
    /// dispatcher.
    ///
    /// An agent that fails to start is reported as an `agent-failure` and
    /// does not stop the others.
    ///
    /// # Errors
    /// Returns `AlreadyRunning` if the orchestrator is running.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if *running {
            return Err(OrchestrationError::AlreadyRunning("orchestrator"));
        }

        self.bus
            .register_inbox(self.id.clone(), Arc::new(NoticeInbox { board: Arc::clone(&self.notices) }))
            .await;

        let agents = self.bus.registry().agents().await;
        for agent in &agents {
            let agent_type = agent.agent_type();
            match agent.start().await {
                Ok(()) => debug!(agent = %agent_type, "Agent started"),
                Err(e) => {
                    warn!(agent = %agent_type, error = %e, "Agent failed to start");
                    self.bus.report_agent_failure(agent_type, format!("start failed: {e}")).await;
                }
            }
        }

        self.dispatcher.start().await?;
        *running = true;
        info!(agents = agents.len(), strategy = %self.strategy, "Orchestrator started");
        Ok(())
    }

    /// Stops agents in reverse registration order and stops the dispatcher.
    /// Idempotent.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        if !*running {
            return;
        }

        let agents = self.bus.registry().agents().await;
        for agent in agents.iter().rev() {
            if let Err(e) = agent.stop().await {
                warn!(agent = %agent.agent_type(), error = %e, "Agent failed to stop");
            }
        }

        self.dispatcher.stop().await;
        self.bus.remove_inbox(&self.id).await;
        *running = false;
        info!("Orchestrator stopped");
    }

    /// True between `start` and `stop`.
    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Creates a fresh state for the learner, replacing any previous one.
    pub async fn initialize_learning_state(&self, learner_id: &str, profile: LearnerProfile) -> LearningState {
        let state = self.store.initialize(learner_id, profile).await;
        self.notices.take(learner_id);
        info!(
            learner_id = %learner_id,
            session_id = %state.session_id,
            objectives = state.objectives.len(),
            attention_span = state.engagement.attention_span_minutes,
            "Learning state initialized"
        );
        state
    }

    /// Snapshot of the learner's state.
    pub async fn learning_state(&self, learner_id: &str) -> Option<LearningState> {
        self.store.snapshot(learner_id).await
    }

    /// IDs of all initialized learners, sorted.
    pub async fn active_learners(&self) -> Vec<String> {
        self.store.learner_ids().await
    }

    /// Runs one interaction through the pipeline. Never fails: any error
    /// becomes the fixed apology.
    pub async fn process_student_interaction(
        &self,
        learner_id: &str,
        interaction: StudentInteraction,
    ) -> InteractionResult {
        match self.run_pipeline(learner_id, &interaction).await {
            Ok(result) => result,
            Err(e) => {
                error!(learner_id = %learner_id, error = %e, "Interaction pipeline failed");
                InteractionResult::apology()
            }
        }
    }

    async fn run_pipeline(&self, learner_id: &str, interaction: &StudentInteraction) -> Result<InteractionResult> {
        let slot = self
            .store
            .slot(learner_id)
            .await
            .ok_or_else(|| OrchestrationError::LearnerNotFound(learner_id.to_string()))?;
        let mut state = slot.lock().await;

        let assessment = self.assess(learner_id, interaction, &state).await?;
        let mut patch = StatePatch::from_assessment(&assessment, &state);
        let mut assessed = state.clone();
        assessed.apply(&patch);

        let recommendations = self.recommend(learner_id, interaction, &assessment, &assessed).await;

        let decisions = self.strategy.resolve(&recommendations, assessed.engagement.current_engagement);

        let outcome = self.executors.execute_all(&decisions);
        let response = outcome.response_or_default();
        let mut actions = outcome.actions;
        for tag in self.notices.take(learner_id) {
            if !actions.contains(&tag) {
                actions.push(tag);
            }
        }
        patch.merge(outcome.patch);
        patch.context_entry = Some(ContextEntry {
            timestamp: Utc::now(),
            learner_message: interaction.content.clone(),
            response: response.clone(),
        });

        state.apply(&patch);
        let session_id = state.session_id.clone();
        drop(state);

        self.bus
            .publish(AgentEvent::new(
                Participant::Orchestrator,
                EventPayload::StateUpdated { learner_id: learner_id.to_string(), session_id },
                Priority::Medium,
            ))
            .await;

        info!(
            learner_id = %learner_id,
            recommendations = recommendations.len(),
            decisions = decisions.len(),
            actions = actions.len(),
            "Interaction processed"
        );
        Ok(InteractionResult { response, actions })
    }

    async fn assess(
        &self,
        learner_id: &str,
        interaction: &StudentInteraction,
        state: &LearningState,
    ) -> Result<Assessment> {
        let message = AgentMessage::new(
            Participant::Orchestrator,
            Recipient::Agent(AgentType::Assessment),
            MessagePayload::AssessInteraction {
                learner_id: learner_id.to_string(),
                interaction: interaction.clone(),
                state: Box::new(state.clone()),
            },
            Priority::High,
        );

        match self.bus.request(message, self.config.request_timeout()).await {
            Ok(response) => match response.payload {
                Some(ResponsePayload::Assessment(assessment)) => Ok(assessment),
                _ => Err(OrchestrationError::UnexpectedResponse {
                    agent: AgentType::Assessment,
                    expected: "assessment",
                }),
            },
            Err(OrchestrationError::AgentDegraded(_)) => {
                debug!(learner_id = %learner_id, "Assessment degraded, using basic assessment");
                Ok(basic_assessment(interaction, state))
            }
            Err(e) => Err(e),
        }
    }

    async fn recommend(
        &self,
        learner_id: &str,
        interaction: &StudentInteraction,
        assessment: &Assessment,
        state: &LearningState,
    ) -> Vec<SourcedRecommendation> {
        let timeout = self.config.request_timeout();
        let requests = AgentType::RECOMMENDERS.into_iter().map(|agent_type| {
            let message = AgentMessage::new(
                Participant::Orchestrator,
                Recipient::Agent(agent_type),
                MessagePayload::RecommendationRequest {
                    learner_id: learner_id.to_string(),
                    interaction: interaction.clone(),
                    assessment: assessment.clone(),
                    state: Box::new(state.clone()),
                },
                Priority::High,
            );
            async move { (agent_type, self.bus.request(message, timeout).await) }
        });

        let mut collected = Vec::new();
        for (agent_type, result) in join_all(requests).await {
            match result {
                Ok(response) => match response.payload {
                    Some(ResponsePayload::Recommendations(recommendations)) => {
                        collected.extend(
                            recommendations
                                .into_iter()
                                .map(|recommendation| SourcedRecommendation { source: agent_type, recommendation }),
                        );
                    }
                    _ => warn!(agent = %agent_type, "Recommender answered without recommendations"),
                },
                Err(e) => warn!(agent = %agent_type, error = %e, "Recommender failed, continuing without it"),
            }
        }
        collected
    }
}
