//! Failure recovery supervisor.
//!
//! The supervisor listens for `agent-failure` events, polls agent health on
//! a [`HealthTicker`], and restarts failing agents after a fixed delay. An
//! agent that cannot be restarted within the configured number of attempts
//! is handed to the failover hook, then degraded: its predeclared
//! [`FallbackBehavior`] is activated and the bus stops routing to it.
//!
//! ```text
//! Healthy --failure--> Recovering --restart ok--> Healthy
//!                                 --exhausted---> Degraded --reset--> Healthy
//! ```

pub mod fallback;
pub mod recovery;
pub mod ticker;

pub use fallback::{FallbackBehavior, basic_assessment, fallback_for};
pub use recovery::{FailureRecord, RecoveryState};
pub use ticker::HealthTicker;

use crate::agent::AgentHealthStatus;
use crate::bus::{EventHandler, MessageBus};
use crate::config::SupervisorConfig;
use crate::error::{OrchestrationError, Result};
use crate::messages::{AgentEvent, EventKind, EventPayload};
use crate::types::{AgentType, Participant, Priority};
use async_trait::async_trait;
use chrono::Utc;
use recovery::{AgentRecord, FailureLog};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of asking the failover hook for help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverOutcome {
    /// Another instance took over; the agent is healthy again.
    Recovered,
    /// Nothing to fail over to.
    NoFailover,
}

/// Called once restarts are exhausted, before the fallback is activated.
#[async_trait]
pub trait FailoverHook: Send + Sync {
    /// Attempts to fail `agent` over to another instance.
    async fn failover(&self, agent: AgentType) -> FailoverOutcome;
}

/// Default hook: there is never anything to fail over to.
#[derive(Debug, Default)]
pub struct NoFailover;

#[async_trait]
impl FailoverHook for NoFailover {
    async fn failover(&self, agent: AgentType) -> FailoverOutcome {
        debug!(agent = %agent, "No failover available");
        FailoverOutcome::NoFailover
    }
}

/// One line of a health poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentHealthReport {
    /// The agent's own health snapshot.
    pub status: AgentHealthStatus,
    /// The supervisor's recovery state for it.
    pub recovery: RecoveryState,
    /// Active fallback mode, if degraded.
    pub fallback: Option<&'static str>,
}

/// Forwards `agent-failure` events to the supervisor.
struct FailureEventHandler {
    supervisor: Weak<FailureRecoverySupervisor>,
}

#[async_trait]
impl EventHandler for FailureEventHandler {
    async fn handle(&self, event: &AgentEvent) -> anyhow::Result<()> {
        let EventPayload::AgentFailure { agent, reason } = &event.payload else {
            return Ok(());
        };
        if let Some(supervisor) = self.supervisor.upgrade() {
            supervisor.report_failure(*agent, reason.clone()).await;
        }
        Ok(())
    }
}

/// Restarts failing agents and degrades the ones that stay down.
pub struct FailureRecoverySupervisor {
    bus: Arc<MessageBus>,
    config: SupervisorConfig,
    failover: Arc<dyn FailoverHook>,
    records: Mutex<HashMap<AgentType, AgentRecord>>,
    failures: Mutex<FailureLog>,
    ticker: Mutex<Option<HealthTicker>>,
    recoveries: Mutex<Vec<JoinHandle<()>>>,
    shutdown: std::sync::Mutex<CancellationToken>,
    attached: AtomicBool,
}

impl fmt::Debug for FailureRecoverySupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureRecoverySupervisor")
            .field("config", &self.config)
            .field("tracked_agents", &self.records.try_lock().map(|r| r.len()).unwrap_or(0))
            .field("running", &self.ticker.try_lock().map(|t| t.is_some()).unwrap_or(true))
            .finish_non_exhaustive()
    }
}

impl FailureRecoverySupervisor {
    /// Creates a stopped supervisor.
    ///
    /// # Arguments
    /// * `bus` - The bus whose registered agents are supervised
    /// * `config` - Restart, polling and alerting settings
    #[must_use]
    pub fn new(bus: Arc<MessageBus>, config: SupervisorConfig) -> Self {
        let failures = FailureLog::new(config.failure_log_capacity);
        Self {
            bus,
            config,
            failover: Arc::new(NoFailover),
            records: Mutex::new(HashMap::new()),
            failures: Mutex::new(failures),
            ticker: Mutex::new(None),
            recoveries: Mutex::new(Vec::new()),
            shutdown: std::sync::Mutex::new(CancellationToken::new()),
            attached: AtomicBool::new(false),
        }
    }

    /// Replaces the failover hook.
    #[must_use]
    pub fn with_failover_hook(mut self, hook: Arc<dyn FailoverHook>) -> Self {
        self.failover = hook;
        self
    }

    /// The supervisor configuration.
    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Subscribes to `agent-failure` events on the bus. Idempotent.
    pub async fn attach(self: &Arc<Self>) {
        if self.attached.swap(true, Ordering::SeqCst) {
            return;
        }
        let handler = FailureEventHandler { supervisor: Arc::downgrade(self) };
        self.bus.register_handler(EventKind::AgentFailure, Arc::new(handler)).await;
    }

    /// Attaches to the bus and starts the health poll.
    ///
    /// # Errors
    /// Returns `AlreadyRunning` if the supervisor is already running.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut ticker = self.ticker.lock().await;
        if ticker.is_some() {
            return Err(OrchestrationError::AlreadyRunning("supervisor"));
        }
        self.attach().await;

        let weak = Arc::downgrade(self);
        *ticker = Some(HealthTicker::spawn(self.config.health_check_interval(), move || {
            let weak = weak.clone();
            async move {
                if let Some(supervisor) = weak.upgrade() {
                    supervisor.poll_health().await;
                }
            }
        }));

        info!(
            interval = ?self.config.health_check_interval(),
            max_restart_attempts = self.config.max_restart_attempts,
            "Supervisor started"
        );
        Ok(())
    }

    /// Stops the health poll and any restart loop in progress. Idempotent.
    pub async fn stop(&self) {
        let token = {
            let mut shutdown = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *shutdown, CancellationToken::new())
        };
        token.cancel();

        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.stop().await;
            info!("Supervisor stopped");
        }
        self.settle().await;
    }

    /// True while the health poll runs.
    pub async fn is_running(&self) -> bool {
        self.ticker.lock().await.is_some()
    }

    /// Waits for every restart loop started so far to finish.
    pub async fn settle(&self) {
        let handles = std::mem::take(&mut *self.recoveries.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Recovery task ended abnormally");
            }
        }
    }

    /// Runs one health poll over every registered agent.
    ///
    /// A healthy answer clears the agent's restart attempts and consecutive
    /// failures; an unhealthy one counts as a failure.
    pub async fn poll_health(self: &Arc<Self>) -> Vec<AgentHealthReport> {
        let agents = self.bus.registry().agents().await;
        let mut reports = Vec::with_capacity(agents.len());

        for agent in agents {
            let agent_type = agent.agent_type();
            let status = agent.health_status();

            let state = {
                let mut records = self.records.lock().await;
                let record = records.entry(agent_type).or_default();
                if record.state == RecoveryState::Healthy
                    && status.healthy
                    && (record.attempts > 0 || record.consecutive_failures > 0)
                {
                    debug!(agent = %agent_type, attempts = record.attempts, "Healthy poll clears failure counters");
                    record.attempts = 0;
                    record.consecutive_failures = 0;
                    record.alerted = false;
                }
                record.state
            };

            if state == RecoveryState::Healthy && !status.healthy {
                self.report_failure(agent_type, "health check failed").await;
            }

            let (recovery, fallback) = {
                let records = self.records.lock().await;
                records
                    .get(&agent_type)
                    .map_or((RecoveryState::Healthy, None), |r| (r.state, r.fallback.as_ref().map(|f| f.mode)))
            };
            reports.push(AgentHealthReport { status, recovery, fallback });
        }

        debug!(agents = reports.len(), "Health poll finished");
        reports
    }

    /// Records a failure and starts a restart loop if the agent is healthy.
    ///
    /// Failures of recovering or degraded agents are only recorded.
    pub async fn report_failure(self: &Arc<Self>, agent_type: AgentType, reason: impl Into<String>) {
        if self.record_failure(agent_type, reason.into()).await {
            self.spawn_recovery(agent_type).await;
        }
    }

    /// The agent's own health snapshot, if it is registered.
    pub async fn health(&self, agent_type: AgentType) -> Option<AgentHealthStatus> {
        self.bus.registry().get(agent_type).await.map(|agent| agent.health_status())
    }

    /// Where the agent stands in the recovery state machine.
    pub async fn recovery_state(&self, agent_type: AgentType) -> RecoveryState {
        self.records.lock().await.get(&agent_type).map(|r| r.state).unwrap_or_default()
    }

    /// The active fallback, if the agent is degraded.
    pub async fn active_fallback(&self, agent_type: AgentType) -> Option<FallbackBehavior> {
        self.records.lock().await.get(&agent_type).and_then(|r| r.fallback.clone())
    }

    /// Recorded failures, oldest first.
    pub async fn failure_log(&self) -> Vec<FailureRecord> {
        self.failures.lock().await.snapshot()
    }

    /// Brings a degraded agent back: clears its counters, drops the fallback
    /// and lets the bus route to it again.
    ///
    /// Returns `false` while a restart loop is still running.
    pub async fn reset(&self, agent_type: AgentType) -> bool {
        {
            let mut records = self.records.lock().await;
            let record = records.entry(agent_type).or_default();
            if record.state == RecoveryState::Recovering {
                debug!(agent = %agent_type, "Reset ignored while recovering");
                return false;
            }
            *record = AgentRecord::default();
        }
        self.bus.registry().set_degraded(agent_type, false).await;
        info!(agent = %agent_type, "Agent reset");
        true
    }

    /// Bumps counters, logs the failure and raises the alert once the
    /// threshold is reached. Returns true if a restart loop should start.
    async fn record_failure(&self, agent_type: AgentType, reason: String) -> bool {
        let (consecutive, alert, spawn) = {
            let mut records = self.records.lock().await;
            let record = records.entry(agent_type).or_default();
            record.consecutive_failures += 1;
            let alert = !record.alerted && record.consecutive_failures >= self.config.alert_threshold;
            if alert {
                record.alerted = true;
            }
            let spawn =
                record.state == RecoveryState::Healthy && record.transition(RecoveryState::Recovering);
            (record.consecutive_failures, alert, spawn)
        };

        warn!(agent = %agent_type, reason = %reason, consecutive_failures = consecutive, "Agent failure recorded");
        self.failures.lock().await.push(FailureRecord {
            agent: agent_type,
            reason,
            timestamp: Utc::now(),
            consecutive_failures: consecutive,
        });

        if alert {
            error!(
                agent = %agent_type,
                consecutive_failures = consecutive,
                threshold = self.config.alert_threshold,
                "Critical alert: agent keeps failing"
            );
            self.publish(
                EventPayload::CriticalAlert { agent: agent_type, consecutive_failures: consecutive },
                Priority::Urgent,
            )
            .await;
        }
        spawn
    }

    async fn spawn_recovery(self: &Arc<Self>, agent_type: AgentType) {
        let token = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let supervisor = Arc::clone(self);
        let handle = tokio::spawn(async move { supervisor.recover(agent_type, token).await });

        let mut recoveries = self.recoveries.lock().await;
        recoveries.retain(|h| !h.is_finished());
        recoveries.push(handle);
    }

    /// Restart loop for one agent.
    async fn recover(&self, agent_type: AgentType, token: CancellationToken) {
        let max_attempts = self.config.max_restart_attempts;

        loop {
            let attempts = self.records.lock().await.get(&agent_type).map_or(0, |r| r.attempts);
            if attempts >= max_attempts {
                self.exhaust(agent_type).await;
                return;
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.restart_delay()) => {}
                () = token.cancelled() => {
                    debug!(agent = %agent_type, "Recovery cancelled");
                    self.set_state(agent_type, RecoveryState::Healthy).await;
                    return;
                }
            }

            let attempt = {
                let mut records = self.records.lock().await;
                let record = records.entry(agent_type).or_default();
                record.attempts += 1;
                record.attempts
            };

            let Some(agent) = self.bus.registry().get(agent_type).await else {
                warn!(agent = %agent_type, "Agent disappeared from the registry, giving up recovery");
                self.set_state(agent_type, RecoveryState::Healthy).await;
                return;
            };

            info!(agent = %agent_type, attempt, max_attempts, "Restarting agent");
            if let Err(e) = agent.stop().await {
                warn!(agent = %agent_type, error = %e, "Agent stop failed during restart");
            }

            match agent.start().await {
                Ok(()) => {
                    self.set_state(agent_type, RecoveryState::Healthy).await;
                    info!(agent = %agent_type, attempt, "Agent recovered");
                    self.publish(EventPayload::AgentRecovered { agent: agent_type, attempts: attempt }, Priority::High)
                        .await;
                    return;
                }
                Err(e) => {
                    self.record_failure(agent_type, format!("restart attempt {attempt} failed: {e}")).await;
                }
            }
        }
    }

    /// Restarts are exhausted: try failover, else activate the fallback.
    async fn exhaust(&self, agent_type: AgentType) {
        if self.failover.failover(agent_type).await == FailoverOutcome::Recovered {
            info!(agent = %agent_type, "Agent failed over");
            let mut records = self.records.lock().await;
            let record = records.entry(agent_type).or_default();
            record.attempts = 0;
            record.transition(RecoveryState::Healthy);
            return;
        }

        let mut fallback = fallback_for(agent_type);
        fallback.active = true;
        let mode = fallback.mode;
        {
            let mut records = self.records.lock().await;
            let record = records.entry(agent_type).or_default();
            record.fallback = Some(fallback);
            record.transition(RecoveryState::Degraded);
        }
        self.bus.registry().set_degraded(agent_type, true).await;

        error!(
            agent = %agent_type,
            mode,
            attempts = self.config.max_restart_attempts,
            "Restart attempts exhausted, agent degraded"
        );
        self.publish(EventPayload::AgentDegraded { agent: agent_type, mode: mode.to_string() }, Priority::High)
            .await;
    }

    async fn set_state(&self, agent_type: AgentType, state: RecoveryState) {
        let mut records = self.records.lock().await;
        let record = records.entry(agent_type).or_default();
        if !record.transition(state) {
            warn!(agent = %agent_type, from = %record.state, to = %state, "Invalid recovery transition");
        }
    }

    async fn publish(&self, payload: EventPayload, priority: Priority) {
        self.bus.publish(AgentEvent::new(Participant::Supervisor, payload, priority)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::testing::ScriptedAgent;
    use std::time::Duration;

    async fn supervised(agent: ScriptedAgent, config: SupervisorConfig) -> (Arc<FailureRecoverySupervisor>, Arc<ScriptedAgent>, Arc<MessageBus>) {
        let bus = Arc::new(MessageBus::default());
        let agent = Arc::new(agent);
        bus.register_agent(Arc::clone(&agent) as Arc<dyn Agent>).await.unwrap();
        let supervisor = Arc::new(FailureRecoverySupervisor::new(Arc::clone(&bus), config));
        (supervisor, agent, bus)
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_after_exhausting_restarts() {
        let agent = ScriptedAgent::new(AgentType::Assessment).failing_start().failing_messages();
        let (supervisor, agent, bus) = supervised(agent, SupervisorConfig::default()).await;

        supervisor.report_failure(AgentType::Assessment, "boom").await;
        assert_eq!(supervisor.recovery_state(AgentType::Assessment).await, RecoveryState::Recovering);
        supervisor.settle().await;

        assert_eq!(supervisor.recovery_state(AgentType::Assessment).await, RecoveryState::Degraded);
        assert_eq!(agent.start_count(), 3);
        let fallback = supervisor.active_fallback(AgentType::Assessment).await.unwrap();
        assert_eq!(fallback.mode, "basic_assessment");
        assert!(fallback.active);
        assert!(bus.registry().is_degraded(AgentType::Assessment).await);
        assert_eq!(supervisor.failure_log().await.len(), 4);
        // agent-degraded only; four failures stay under the alert threshold.
        assert_eq!(bus.pending().await, (1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_delay() {
        let (supervisor, agent, _bus) =
            supervised(ScriptedAgent::new(AgentType::Game), SupervisorConfig::default()).await;

        supervisor.report_failure(AgentType::Game, "flaky").await;
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(agent.start_count(), 0);

        supervisor.settle().await;
        assert_eq!(agent.start_count(), 1);
        assert_eq!(agent.stop_count(), 1);
        assert_eq!(supervisor.recovery_state(AgentType::Game).await, RecoveryState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_restart_then_poll_clears_attempts() {
        let config = SupervisorConfig { max_restart_attempts: 1, ..SupervisorConfig::default() };
        let (supervisor, agent, bus) = supervised(ScriptedAgent::new(AgentType::Reflection), config).await;

        supervisor.report_failure(AgentType::Reflection, "first").await;
        supervisor.settle().await;
        assert_eq!(supervisor.recovery_state(AgentType::Reflection).await, RecoveryState::Healthy);
        assert_eq!(bus.metrics().await.events_published, 1);

        // The agent is running again, so the poll is healthy and clears the attempt.
        let reports = supervisor.poll_health().await;
        assert!(reports[0].status.healthy);

        supervisor.report_failure(AgentType::Reflection, "second").await;
        supervisor.settle().await;
        assert_eq!(supervisor.recovery_state(AgentType::Reflection).await, RecoveryState::Healthy);
        assert_eq!(agent.start_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_alert_at_threshold() {
        let config = SupervisorConfig { alert_threshold: 2, ..SupervisorConfig::default() };
        let agent = ScriptedAgent::new(AgentType::Communication).failing_start();
        let (supervisor, _agent, bus) = supervised(agent, config).await;

        supervisor.report_failure(AgentType::Communication, "boom").await;
        supervisor.settle().await;

        // One critical alert plus agent-degraded.
        assert_eq!(bus.pending().await, (2, 0));
        let log = supervisor.failure_log().await;
        assert_eq!(log.last().unwrap().consecutive_failures, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_restarts_unhealthy_agent() {
        // Never started, so it reports itself unhealthy.
        let (supervisor, agent, _bus) =
            supervised(ScriptedAgent::new(AgentType::PathPlanning), SupervisorConfig::default()).await;

        let reports = supervisor.poll_health().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].recovery, RecoveryState::Recovering);

        supervisor.settle().await;
        assert_eq!(agent.start_count(), 1);
        assert!(supervisor.health(AgentType::PathPlanning).await.unwrap().healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_degraded_agent() {
        let config = SupervisorConfig { max_restart_attempts: 1, ..SupervisorConfig::default() };
        let agent = ScriptedAgent::new(AgentType::Intervention).failing_start();
        let (supervisor, _agent, bus) = supervised(agent, config).await;

        supervisor.report_failure(AgentType::Intervention, "boom").await;
        supervisor.settle().await;
        assert_eq!(supervisor.recovery_state(AgentType::Intervention).await, RecoveryState::Degraded);

        assert!(supervisor.reset(AgentType::Intervention).await);
        assert_eq!(supervisor.recovery_state(AgentType::Intervention).await, RecoveryState::Healthy);
        assert!(supervisor.active_fallback(AgentType::Intervention).await.is_none());
        assert!(!bus.registry().is_degraded(AgentType::Intervention).await);
    }

    struct AlwaysFailover;

    #[async_trait]
    impl FailoverHook for AlwaysFailover {
        async fn failover(&self, _agent: AgentType) -> FailoverOutcome {
            FailoverOutcome::Recovered
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_hook_prevents_degradation() {
        let bus = Arc::new(MessageBus::default());
        let agent = Arc::new(ScriptedAgent::new(AgentType::Game).failing_start());
        bus.register_agent(agent as Arc<dyn Agent>).await.unwrap();
        let supervisor = Arc::new(
            FailureRecoverySupervisor::new(Arc::clone(&bus), SupervisorConfig::default())
                .with_failover_hook(Arc::new(AlwaysFailover)),
        );

        supervisor.report_failure(AgentType::Game, "boom").await;
        supervisor.settle().await;

        assert_eq!(supervisor.recovery_state(AgentType::Game).await, RecoveryState::Healthy);
        assert!(supervisor.active_fallback(AgentType::Game).await.is_none());
        assert!(!bus.registry().is_degraded(AgentType::Game).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_events_reach_supervisor() {
        let (supervisor, agent, bus) =
            supervised(ScriptedAgent::new(AgentType::Game), SupervisorConfig::default()).await;
        supervisor.attach().await;
        supervisor.attach().await;

        bus.report_agent_failure(AgentType::Game, "crashed").await;
        bus.drain().await;
        supervisor.settle().await;

        assert_eq!(supervisor.failure_log().await.len(), 1);
        assert_eq!(agent.start_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_and_stop_twice() {
        let (supervisor, _agent, _bus) =
            supervised(ScriptedAgent::new(AgentType::Game), SupervisorConfig::default()).await;

        supervisor.start().await.unwrap();
        assert!(matches!(supervisor.start().await, Err(OrchestrationError::AlreadyRunning(_))));
        assert!(supervisor.is_running().await);

        supervisor.stop().await;
        supervisor.stop().await;
        assert!(!supervisor.is_running().await);
    }
}
