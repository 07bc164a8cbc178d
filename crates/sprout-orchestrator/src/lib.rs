//! Agent orchestration engine for Sprout.
//!
//! A priority [`MessageBus`] connects seven tutoring agents. The
//! [`LearningOrchestrator`] turns each learner interaction into a reply by
//! running assess, recommend, decide, execute and persist stages, and the
//! [`FailureRecoverySupervisor`] restarts failing agents or swaps in a
//! fallback once restarts run out. [`Engine`] wires the three together.
//!
//! ```no_run
//! use sprout_orchestrator::{Engine, EngineConfig, LearnerProfile, StudentInteraction};
//! use sprout_models::MockModel;
//! use std::sync::Arc;
//!
//! # async fn run() -> sprout_orchestrator::Result<()> {
//! let engine = Engine::builder(EngineConfig::default())
//!     .with_default_agents(Arc::new(MockModel::new("mock".into())))
//!     .build()
//!     .await?;
//! engine.start().await?;
//!
//! let orchestrator = engine.orchestrator();
//! orchestrator.initialize_learning_state("ada", LearnerProfile::new("Ada", 8)).await;
//! let result = orchestrator
//!     .process_student_interaction("ada", StudentInteraction::chat("what is 3 + 4?"))
//!     .await;
//! println!("{}", result.response);
//!
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agents;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod orchestrator;
pub mod registry;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod testing;
pub mod types;

pub use agent::{Agent, AgentContext, AgentHealthStatus, HealthTracker};
pub use agents::default_agents;
pub use bus::{BusDispatcher, BusMetrics, DrainReport, EventHandler, MessageBus, MessageHandler};
pub use config::{
    BusConfig, ConfigError, EngineConfig, ModelSettings, OrchestratorConfig, SupervisorConfig,
};
pub use engine::{Engine, EngineBuilder};
pub use error::{OrchestrationError, Result};
pub use messages::{
    AgentEvent, AgentMessage, AgentResponse, EventKind, EventPayload, MessageKind,
    MessagePayload, NoticeTopic, ResponsePayload,
};
pub use orchestrator::{ConflictStrategy, InteractionResult, LearningOrchestrator};
pub use registry::AgentRegistry;
pub use state::{
    Assessment, InteractionKind, LearnerProfile, LearningState, StatePatch, StudentInteraction,
};
pub use store::LearningStateStore;
pub use supervisor::{
    AgentHealthReport, FailoverHook, FailoverOutcome, FailureRecord, FailureRecoverySupervisor,
    RecoveryState,
};
pub use types::{
    AgentType, Decision, Participant, Priority, Recipient, Recommendation,
    RecommendationCategory, SourcedRecommendation,
};
