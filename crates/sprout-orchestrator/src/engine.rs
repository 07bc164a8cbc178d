//! Engine wiring: one bus, one orchestrator, one supervisor.

use crate::agent::Agent;
use crate::agents::default_agents;
use crate::bus::MessageBus;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::orchestrator::LearningOrchestrator;
use crate::supervisor::{AgentHealthReport, FailoverHook, FailureRecoverySupervisor};
use sprout_abstraction::Model;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    agents: Vec<Arc<dyn Agent>>,
    failover: Option<Arc<dyn FailoverHook>>,
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("agents", &self.agents.iter().map(|a| a.agent_type()).collect::<Vec<_>>())
            .field("failover", &self.failover.is_some())
            .finish()
    }
}

impl EngineBuilder {
    /// Adds the seven default agents, sharing `model`.
    #[must_use]
    pub fn with_default_agents(mut self, model: Arc<dyn Model>) -> Self {
        self.agents.extend(default_agents(model));
        self
    }

    /// Adds one agent.
    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Replaces the supervisor's failover hook.
    #[must_use]
    pub fn with_failover_hook(mut self, hook: Arc<dyn FailoverHook>) -> Self {
        self.failover = Some(hook);
        self
    }

    /// Validates the configuration and wires the engine.
    ///
    /// # Errors
    /// Returns `Config` for an invalid configuration and `DuplicateAgent` if
    /// two agents share a type.
    pub async fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let bus = Arc::new(MessageBus::new(self.config.bus.clone()));
        let orchestrator =
            Arc::new(LearningOrchestrator::new(Arc::clone(&bus), self.config.orchestrator.clone())?);
        let mut supervisor = FailureRecoverySupervisor::new(Arc::clone(&bus), self.config.supervisor.clone());
        if let Some(hook) = self.failover {
            supervisor = supervisor.with_failover_hook(hook);
        }
        let supervisor = Arc::new(supervisor);
        // Attach before any agent starts so start failures reach the supervisor.
        supervisor.attach().await;

        for agent in self.agents {
            orchestrator.register(agent).await?;
        }

        info!(
            agents = bus.registry().count().await,
            strategy = %orchestrator.strategy(),
            "Engine built"
        );
        Ok(Engine { config: self.config, bus, orchestrator, supervisor })
    }
}

/// A wired engine.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    bus: Arc<MessageBus>,
    orchestrator: Arc<LearningOrchestrator>,
    supervisor: Arc<FailureRecoverySupervisor>,
}

impl Engine {
    /// Starts building an engine from `config`.
    #[must_use]
    pub const fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder { config, agents: Vec::new(), failover: None }
    }

    /// Starts the orchestrator, then the supervisor. If the supervisor
    /// cannot start, the orchestrator is stopped again.
    ///
    /// # Errors
    /// Returns `AlreadyRunning` if the engine is running.
    pub async fn start(&self) -> Result<()> {
        self.orchestrator.start().await?;
        if let Err(e) = self.supervisor.start().await {
            warn!(error = %e, "Supervisor failed to start, stopping orchestrator");
            self.orchestrator.stop().await;
            return Err(e);
        }
        info!("Engine started");
        Ok(())
    }

    /// Stops the supervisor, then the orchestrator. Idempotent.
    pub async fn stop(&self) {
        self.supervisor.stop().await;
        self.orchestrator.stop().await;
    }

    /// Runs one health poll.
    pub async fn health_report(&self) -> Vec<AgentHealthReport> {
        self.supervisor.poll_health().await
    }

    /// The configuration the engine was built with.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared bus.
    pub const fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// The orchestrator.
    pub const fn orchestrator(&self) -> &Arc<LearningOrchestrator> {
        &self.orchestrator
    }

    /// The supervisor.
    pub const fn supervisor(&self) -> &Arc<FailureRecoverySupervisor> {
        &self.supervisor
    }
}
