//! The agent capability abstraction.
//!
//! Agents are addressed only by their [`AgentType`] and reached only through
//! the bus. Each one carries a [`HealthTracker`] so the supervisor sees the
//! same uptime/error bookkeeping for every agent.

use crate::bus::MessageBus;
use crate::messages::{AgentMessage, AgentResponse, EventKind};
use crate::types::AgentType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Consecutive failures after which an agent reports itself unhealthy.
pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;

/// Represents the context provided to an agent while it handles a message.
#[derive(Debug, Clone)]
pub struct AgentContext<'a> {
    /// The bus, for publishing events and routing follow-up messages.
    pub bus: &'a MessageBus,
    /// Cancelled when the caller stops waiting for this invocation.
    pub cancel: CancellationToken,
}

/// Health snapshot of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentHealthStatus {
    /// Agent reporting.
    pub agent: AgentType,
    /// Whether the agent considers itself healthy.
    pub healthy: bool,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Time since the last successful start.
    pub uptime: Duration,
    /// Failures since creation.
    pub error_count: u64,
    /// When the agent was last restarted.
    pub last_restart: Option<DateTime<Utc>>,
}

/// A trait that defines the interface for every tutoring agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the type tag the agent is addressed by.
    fn agent_type(&self) -> AgentType;

    /// Initializes the agent.
    ///
    /// # Errors
    /// Returns an error if the agent cannot start; the orchestrator reports
    /// it to the supervisor and keeps going.
    async fn start(&self) -> anyhow::Result<()>;

    /// Handles one message.
    ///
    /// Must finish in bounded time and never fail: internal errors come back
    /// as [`AgentResponse::failure`].
    ///
    /// # Arguments
    /// * `message` - The message to handle
    /// * `ctx` - Bus access and cancellation for this invocation
    async fn handle_message(&self, message: &AgentMessage, ctx: AgentContext<'_>) -> AgentResponse;

    /// Shuts the agent down.
    ///
    /// # Errors
    /// Returns an error if shutdown fails; callers log and continue.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Returns a cheap health snapshot.
    fn health_status(&self) -> AgentHealthStatus;

    /// Event kinds delivered to this agent once registered.
    fn subscriptions(&self) -> Vec<EventKind> {
        Vec::new()
    }
}

/// Uptime/error/consecutive-failure bookkeeping shared by all agents.
#[derive(Debug)]
pub struct HealthTracker {
    agent: AgentType,
    running: AtomicBool,
    consecutive_failures: AtomicU32,
    error_count: AtomicU64,
    starts: AtomicU32,
    started_at: Mutex<Option<Instant>>,
    last_restart: Mutex<Option<DateTime<Utc>>>,
}

impl HealthTracker {
    /// Creates a tracker for a stopped agent.
    #[must_use]
    pub fn new(agent: AgentType) -> Self {
        Self {
            agent,
            running: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            error_count: AtomicU64::new(0),
            starts: AtomicU32::new(0),
            started_at: Mutex::new(None),
            last_restart: Mutex::new(None),
        }
    }

    /// Records a successful start. Every start after the first counts as a restart.
    pub fn mark_started(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.started_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        if self.starts.fetch_add(1, Ordering::SeqCst) > 0 {
            *self.last_restart.lock().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        }
    }

    /// Records a stop.
    pub fn mark_stopped(&self) {
        self.running.store(false, Ordering::SeqCst);
        *self.started_at.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Records a handled message.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Records a failure and returns the consecutive count.
    pub fn record_failure(&self) -> u32 {
        self.error_count.fetch_add(1, Ordering::SeqCst);
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// True between a start and the next stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Builds the health snapshot.
    pub fn status(&self) -> AgentHealthStatus {
        let consecutive_failures = self.consecutive_failures.load(Ordering::SeqCst);
        let uptime = self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map_or(Duration::ZERO, |at| at.elapsed());

        AgentHealthStatus {
            agent: self.agent,
            healthy: self.is_running() && consecutive_failures < UNHEALTHY_AFTER_FAILURES,
            consecutive_failures,
            uptime,
            error_count: self.error_count.load(Ordering::SeqCst),
            last_restart: *self.last_restart.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_starts_unhealthy_until_started() {
        let tracker = HealthTracker::new(AgentType::Game);
        assert!(!tracker.status().healthy);

        tracker.mark_started();
        let status = tracker.status();
        assert!(status.healthy);
        assert_eq!(status.agent, AgentType::Game);
        assert!(status.last_restart.is_none());
    }

    #[test]
    fn test_tracker_failures_and_recovery() {
        let tracker = HealthTracker::new(AgentType::Assessment);
        tracker.mark_started();

        for expected in 1..=UNHEALTHY_AFTER_FAILURES {
            assert_eq!(tracker.record_failure(), expected);
        }
        let status = tracker.status();
        assert!(!status.healthy);
        assert_eq!(status.error_count, u64::from(UNHEALTHY_AFTER_FAILURES));

        tracker.record_success();
        let status = tracker.status();
        assert!(status.healthy);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.error_count, u64::from(UNHEALTHY_AFTER_FAILURES));
    }

    #[test]
    fn test_tracker_restart_is_recorded() {
        let tracker = HealthTracker::new(AgentType::Reflection);
        tracker.mark_started();
        tracker.mark_stopped();
        assert!(!tracker.is_running());
        assert_eq!(tracker.status().uptime, Duration::ZERO);

        tracker.mark_started();
        assert!(tracker.status().last_restart.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_uptime_follows_clock() {
        let tracker = HealthTracker::new(AgentType::Communication);
        tracker.mark_started();
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(tracker.status().uptime, Duration::from_secs(90));
    }
}
