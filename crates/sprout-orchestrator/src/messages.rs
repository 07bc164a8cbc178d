//! Events, messages and responses carried by the bus.
//!
//! Payloads are closed enums: the event kind is derived from the payload
//! variant, so a handler registered for a kind always sees the same shape.

use crate::state::{Assessment, LearningState, StudentInteraction};
use crate::types::{AgentType, Participant, Priority, Recipient, Recommendation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Event type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A learner's state was persisted.
    StateUpdated,
    /// An agent failed at runtime.
    AgentFailure,
    /// An agent ran out of restarts and now runs on a fallback.
    AgentDegraded,
    /// Consecutive failures crossed the alert threshold.
    CriticalAlert,
    /// The intervention agent decided the learner needs help.
    InterventionTriggered,
    /// An agent came back after a restart.
    AgentRecovered,
}

impl EventKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StateUpdated => "state-updated",
            Self::AgentFailure => "agent-failure",
            Self::AgentDegraded => "agent-degraded",
            Self::CriticalAlert => "critical-alert",
            Self::InterventionTriggered => "intervention-triggered",
            Self::AgentRecovered => "agent-recovered",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event data, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventPayload {
    /// A learner's state was persisted.
    StateUpdated {
        /// Learner whose state changed.
        learner_id: String,
        /// Session of that state.
        session_id: String,
    },
    /// An agent failed at runtime.
    AgentFailure {
        /// Failing agent.
        agent: AgentType,
        /// What went wrong.
        reason: String,
    },
    /// An agent now runs on a fallback.
    AgentDegraded {
        /// Degraded agent.
        agent: AgentType,
        /// Name of the active fallback mode.
        mode: String,
    },
    /// Consecutive failures crossed the alert threshold.
    CriticalAlert {
        /// Failing agent.
        agent: AgentType,
        /// Consecutive failures so far.
        consecutive_failures: u32,
    },
    /// The learner needs help.
    InterventionTriggered {
        /// Learner concerned.
        learner_id: String,
        /// Why the intervention fired.
        reason: String,
    },
    /// An agent came back after a restart.
    AgentRecovered {
        /// Recovered agent.
        agent: AgentType,
        /// Restart attempts it took.
        attempts: u32,
    },
}

impl EventPayload {
    /// The kind tag of this payload.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::StateUpdated { .. } => EventKind::StateUpdated,
            Self::AgentFailure { .. } => EventKind::AgentFailure,
            Self::AgentDegraded { .. } => EventKind::AgentDegraded,
            Self::CriticalAlert { .. } => EventKind::CriticalAlert,
            Self::InterventionTriggered { .. } => EventKind::InterventionTriggered,
            Self::AgentRecovered { .. } => EventKind::AgentRecovered,
        }
    }
}

/// A published event. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentEvent {
    /// Unique event ID.
    pub id: String,
    /// Producer.
    pub source: Participant,
    /// Data.
    pub payload: EventPayload,
    /// Publish time; ties within a band are broken by it.
    pub timestamp: DateTime<Utc>,
    /// Priority band.
    pub priority: Priority,
}

impl AgentEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(source: Participant, payload: EventPayload, priority: Priority) -> Self {
        Self {
            id: format!("evt-{}", uuid::Uuid::new_v4()),
            source,
            payload,
            timestamp: Utc::now(),
            priority,
        }
    }

    /// Overrides the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The kind tag of this event.
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Expects an answer.
    Request,
    /// Answers a request.
    Response,
    /// Fire and forget.
    Notification,
}

impl MessageKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification topics sent to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeTopic {
    /// Time for a learning game.
    GameSuggestion,
    /// Time to reflect on progress.
    ReflectionPrompt,
}

/// Message data, one variant per request/response/notification shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePayload {
    /// Score one interaction.
    AssessInteraction {
        /// Learner concerned.
        learner_id: String,
        /// The interaction to score.
        interaction: StudentInteraction,
        /// Snapshot of the learner's state.
        state: Box<LearningState>,
    },
    /// Suggest what to do next.
    RecommendationRequest {
        /// Learner concerned.
        learner_id: String,
        /// The interaction being answered.
        interaction: StudentInteraction,
        /// Output of the assess stage.
        assessment: Assessment,
        /// Snapshot of the learner's state after the assessment.
        state: Box<LearningState>,
    },
    /// An event delivered to a subscribed agent.
    Event(AgentEvent),
    /// Agent-to-orchestrator notice.
    Notice {
        /// Learner concerned.
        learner_id: String,
        /// What the notice is about.
        topic: NoticeTopic,
        /// Free-form detail.
        detail: String,
    },
    /// Answer to an earlier routed request.
    Reply {
        /// ID of the request being answered.
        in_reply_to: String,
        /// The answer.
        response: AgentResponse,
    },
}

impl MessagePayload {
    /// The message kind implied by this payload.
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::AssessInteraction { .. } | Self::RecommendationRequest { .. } => {
                MessageKind::Request
            }
            Self::Reply { .. } => MessageKind::Response,
            Self::Event(_) | Self::Notice { .. } => MessageKind::Notification,
        }
    }
}

/// A routed message. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentMessage {
    /// Unique message ID.
    pub id: String,
    /// Sender.
    pub from: Participant,
    /// Receiver.
    pub to: Recipient,
    /// Data.
    pub payload: MessagePayload,
    /// Send time.
    pub timestamp: DateTime<Utc>,
    /// Priority band.
    pub priority: Priority,
}

impl AgentMessage {
    /// Creates a message stamped with the current time.
    #[must_use]
    pub fn new(from: Participant, to: Recipient, payload: MessagePayload, priority: Priority) -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            from,
            to,
            payload,
            timestamp: Utc::now(),
            priority,
        }
    }

    /// The kind of this message.
    pub const fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

/// Data carried by a successful response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum ResponsePayload {
    /// Output of an assessment request.
    Assessment(Assessment),
    /// Output of a recommendation request.
    Recommendations(Vec<Recommendation>),
    /// Nothing to report.
    Acknowledged,
}

/// What an agent answers to a message. Agents never raise; failures come
/// back as `success == false` with an error text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResponse {
    /// Whether the agent handled the message.
    pub success: bool,
    /// Answer data when successful.
    pub payload: Option<ResponsePayload>,
    /// Error text when not.
    pub error: Option<String>,
}

impl AgentResponse {
    /// A successful answer.
    #[must_use]
    pub const fn ok(payload: ResponsePayload) -> Self {
        Self { success: true, payload: Some(payload), error: None }
    }

    /// A successful answer with nothing to report.
    #[must_use]
    pub const fn ack() -> Self {
        Self::ok(ResponsePayload::Acknowledged)
    }

    /// A failed answer.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, payload: None, error: Some(error.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LearnerProfile;

    #[test]
    fn test_event_kind_follows_payload() {
        let event = AgentEvent::new(
            Participant::Supervisor,
            EventPayload::CriticalAlert { agent: AgentType::Game, consecutive_failures: 5 },
            Priority::Urgent,
        );
        assert_eq!(event.kind(), EventKind::CriticalAlert);
        assert_eq!(event.kind().to_string(), "critical-alert");
        assert!(event.id.starts_with("evt-"));
    }

    #[test]
    fn test_message_kind_follows_payload() {
        let state = LearningState::new("kid", LearnerProfile::new("Kid", 7));
        let request = AgentMessage::new(
            Participant::Orchestrator,
            Recipient::Agent(AgentType::Assessment),
            MessagePayload::AssessInteraction {
                learner_id: "kid".to_string(),
                interaction: StudentInteraction::chat("hi"),
                state: Box::new(state),
            },
            Priority::High,
        );
        assert_eq!(request.kind(), MessageKind::Request);

        let reply = MessagePayload::Reply { in_reply_to: request.id, response: AgentResponse::ack() };
        assert_eq!(reply.kind(), MessageKind::Response);
    }

    #[test]
    fn test_response_constructors() {
        assert!(AgentResponse::ack().success);
        let failed = AgentResponse::failure("boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.payload.is_none());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let payload = EventPayload::AgentFailure { agent: AgentType::Assessment, reason: "x".into() };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "agent-failure");
        assert_eq!(json["agent"], "assessment");
    }
}
