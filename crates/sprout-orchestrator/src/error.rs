// Error types for orchestration

use crate::config::ConfigError;
use crate::types::AgentType;
use std::time::Duration;
use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// No agent of this type is registered.
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentType),

    /// The agent did not answer within the deadline.
    #[error("Agent '{agent}' timed out after {timeout:?}")]
    AgentTimeout {
        /// Agent that timed out
        agent: AgentType,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// The agent answered with a failure response.
    #[error("Agent '{agent}' failed to process message: {reason}")]
    AgentProcessingFailure {
        /// Agent that failed
        agent: AgentType,
        /// Error reported by the agent
        reason: String,
    },

    /// The agent has exhausted its restarts and runs on a fallback.
    #[error("Agent '{0}' is degraded")]
    AgentDegraded(AgentType),

    /// An agent of this type is already registered.
    #[error("Agent already registered: {0}")]
    DuplicateAgent(AgentType),

    /// `start()` called on a running component.
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    /// No learning state exists for this learner.
    #[error("No learning state for learner '{0}'")]
    LearnerNotFound(String),

    /// The agent answered with a payload of the wrong shape.
    #[error("Unexpected response from '{agent}': expected {expected}")]
    UnexpectedResponse {
        /// Agent that answered
        agent: AgentType,
        /// Shape the caller expected
        expected: &'static str,
    },

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl OrchestrationError {
    /// Returns the agent this error is attributed to, if any.
    pub fn agent(&self) -> Option<AgentType> {
        match self {
            Self::AgentNotFound(agent)
            | Self::AgentDegraded(agent)
            | Self::DuplicateAgent(agent)
            | Self::AgentTimeout { agent, .. }
            | Self::AgentProcessingFailure { agent, .. }
            | Self::UnexpectedResponse { agent, .. } => Some(*agent),
            Self::AlreadyRunning(_) | Self::LearnerNotFound(_) | Self::Config(_) => None,
        }
    }
}
