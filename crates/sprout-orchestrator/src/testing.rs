//! Scriptable agent for tests and demos.
//!
//! [`ScriptedAgent`] answers every message with a fixed payload and can be
//! told to fail on start, fail on every message, or answer slowly.

use crate::agent::{Agent, AgentContext, AgentHealthStatus, HealthTracker};
use crate::messages::{AgentMessage, AgentResponse, EventKind, ResponsePayload};
use crate::types::AgentType;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// An agent whose behavior is set by the test.
#[derive(Debug)]
pub struct ScriptedAgent {
    agent_type: AgentType,
    health: HealthTracker,
    reply: ResponsePayload,
    delay: Option<Duration>,
    subscriptions: Vec<EventKind>,
    fail_start: AtomicBool,
    fail_messages: AtomicBool,
    starts: AtomicU32,
    stops: AtomicU32,
    received: Mutex<Vec<AgentMessage>>,
}

impl ScriptedAgent {
    /// Creates an agent that acknowledges everything.
    #[must_use]
    pub fn new(agent_type: AgentType) -> Self {
        Self {
            agent_type,
            health: HealthTracker::new(agent_type),
            reply: ResponsePayload::Acknowledged,
            delay: None,
            subscriptions: Vec::new(),
            fail_start: AtomicBool::new(false),
            fail_messages: AtomicBool::new(false),
            starts: AtomicU32::new(0),
            stops: AtomicU32::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Answers every message with `reply`.
    #[must_use]
    pub fn with_reply(mut self, reply: ResponsePayload) -> Self {
        self.reply = reply;
        self
    }

    /// Waits `delay` before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Subscribes to `kinds` on registration.
    #[must_use]
    pub fn subscribed_to(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.subscriptions = kinds.into_iter().collect();
        self
    }

    /// Makes every `start` fail.
    #[must_use]
    pub fn failing_start(self) -> Self {
        self.set_fail_start(true);
        self
    }

    /// Makes every message fail.
    #[must_use]
    pub fn failing_messages(self) -> Self {
        self.set_fail_messages(true);
        self
    }

    /// Toggles start failures.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Toggles message failures.
    pub fn set_fail_messages(&self, fail: bool) {
        self.fail_messages.store(fail, Ordering::SeqCst);
    }

    /// Number of `start` calls so far.
    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls so far.
    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    /// Messages handled so far, in order.
    pub fn received(&self) -> Vec<AgentMessage> {
        self.received.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            self.health.record_failure();
            anyhow::bail!("scripted start failure");
        }
        self.health.mark_started();
        Ok(())
    }

    async fn handle_message(&self, message: &AgentMessage, ctx: AgentContext<'_>) -> AgentResponse {
        if let Some(delay) = self.delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = ctx.cancel.cancelled() => return AgentResponse::failure("cancelled"),
            }
        }

        self.received.lock().unwrap_or_else(PoisonError::into_inner).push(message.clone());

        if self.fail_messages.load(Ordering::SeqCst) {
            self.health.record_failure();
            return AgentResponse::failure("scripted failure");
        }
        self.health.record_success();
        AgentResponse::ok(self.reply.clone())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.health.mark_stopped();
        Ok(())
    }

    fn health_status(&self) -> AgentHealthStatus {
        self.health.status()
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        self.subscriptions.clone()
    }
}
