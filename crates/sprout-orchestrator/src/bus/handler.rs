//! Handler traits for bus consumers that are not agents.

use crate::messages::{AgentEvent, AgentMessage};
use async_trait::async_trait;
use std::fmt;

/// Receives published events of the kinds it was registered for.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event. Errors are logged by the bus and never abort a drain.
    async fn handle(&self, event: &AgentEvent) -> anyhow::Result<()>;
}

/// Receives messages addressed to the orchestrator.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one message. Errors are logged by the bus and never abort a drain.
    async fn handle(&self, message: &AgentMessage) -> anyhow::Result<()>;
}

/// Adapts a synchronous closure into an [`EventHandler`].
pub struct FnEventHandler<F> {
    handler: F,
}

impl<F> FnEventHandler<F>
where
    F: Fn(&AgentEvent) -> anyhow::Result<()> + Send + Sync,
{
    /// Wraps `handler`.
    #[must_use]
    pub const fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> fmt::Debug for FnEventHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEventHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&AgentEvent) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, event: &AgentEvent) -> anyhow::Result<()> {
        (self.handler)(event)
    }
}

/// Adapts a synchronous closure into a [`MessageHandler`].
pub struct FnMessageHandler<F> {
    handler: F,
}

impl<F> FnMessageHandler<F>
where
    F: Fn(&AgentMessage) -> anyhow::Result<()> + Send + Sync,
{
    /// Wraps `handler`.
    #[must_use]
    pub const fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> fmt::Debug for FnMessageHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMessageHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> MessageHandler for FnMessageHandler<F>
where
    F: Fn(&AgentMessage) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, message: &AgentMessage) -> anyhow::Result<()> {
        (self.handler)(message)
    }
}
