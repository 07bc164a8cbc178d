//! Per-agent recovery bookkeeping.

use super::fallback::FallbackBehavior;
use crate::types::AgentType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Where an agent stands in the recovery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryState {
    /// Running normally.
    #[default]
    Healthy,
    /// A restart loop is in progress.
    Recovering,
    /// Restarts exhausted; the fallback is active until reset.
    Degraded,
}

impl RecoveryState {
    /// Checks if the agent can move to `to`.
    ///
    /// Degraded is left only through a manual reset, which goes back to
    /// Healthy.
    #[must_use]
    #[allow(clippy::match_same_arms)] // One arm per transition rule
    pub fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            (Self::Healthy, Self::Recovering) => true,
            (Self::Recovering, Self::Healthy | Self::Degraded) => true,
            (Self::Degraded, Self::Healthy) => true,
            (a, b) if *a == b => true,
            _ => false,
        }
    }

    /// Returns the lowercase name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Recovering => "recovering",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supervisor-side view of one agent.
#[derive(Debug, Clone, Default)]
pub(crate) struct AgentRecord {
    pub(crate) state: RecoveryState,
    pub(crate) attempts: u32,
    pub(crate) consecutive_failures: u32,
    pub(crate) alerted: bool,
    pub(crate) fallback: Option<FallbackBehavior>,
}

impl AgentRecord {
    /// Moves to `to` if the transition is allowed.
    pub(crate) fn transition(&mut self, to: RecoveryState) -> bool {
        if self.state.can_transition_to(to) {
            self.state = to;
            true
        } else {
            false
        }
    }
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Failing agent.
    pub agent: AgentType,
    /// What went wrong.
    pub reason: String,
    /// When it was recorded.
    pub timestamp: DateTime<Utc>,
    /// Consecutive failures including this one.
    pub consecutive_failures: u32,
}

/// Fixed-capacity ring of failures; the oldest entry goes first.
#[derive(Debug)]
pub(crate) struct FailureLog {
    entries: VecDeque<FailureRecord>,
    capacity: usize,
}

impl FailureLog {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity.min(64)), capacity }
    }

    pub(crate) fn push(&mut self, record: FailureRecord) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    pub(crate) fn snapshot(&self) -> Vec<FailureRecord> {
        self.entries.iter().cloned().collect()
    }
}
