//! Core vocabulary shared by the bus, the agents and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of agent kinds. Every agent is addressed only by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    /// Scores each interaction (comprehension, engagement, frustration).
    Assessment,
    /// Produces explanatory content through the completion service.
    ContentGeneration,
    /// Orders concepts and tunes difficulty.
    PathPlanning,
    /// Detects when the learner needs encouragement or a break.
    Intervention,
    /// Writes the child-facing reply through the completion service.
    Communication,
    /// Suggests learning games.
    Game,
    /// Prompts the learner to reflect on progress.
    Reflection,
}

impl AgentType {
    /// Every agent type, in canonical order.
    pub const ALL: [Self; 7] = [
        Self::Assessment,
        Self::ContentGeneration,
        Self::PathPlanning,
        Self::Intervention,
        Self::Communication,
        Self::Game,
        Self::Reflection,
    ];

    /// Agents consulted in parallel during the recommend stage.
    pub const RECOMMENDERS: [Self; 4] =
        [Self::PathPlanning, Self::ContentGeneration, Self::Intervention, Self::Communication];

    /// Returns the wire name of the agent type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Assessment => "assessment",
            Self::ContentGeneration => "content-generation",
            Self::PathPlanning => "path-planning",
            Self::Intervention => "intervention",
            Self::Communication => "communication",
            Self::Game => "game",
            Self::Reflection => "reflection",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown agent type: {s}"))
    }
}

/// Priority band used for queue ordering and decision weighting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low = 1,
    /// Normal traffic.
    #[default]
    Medium = 2,
    /// Should go before normal traffic.
    High = 3,
    /// Goes first.
    Urgent = 4,
}

impl Priority {
    /// Numeric value of the band (low = 1 ... urgent = 4).
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }
}

/// Who produced an event or sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Participant {
    /// A registered agent.
    Agent(AgentType),
    /// The learning orchestrator.
    Orchestrator,
    /// The failure recovery supervisor.
    Supervisor,
}

impl Participant {
    /// Where replies to this participant are delivered, if anywhere.
    pub const fn as_recipient(self) -> Option<Recipient> {
        match self {
            Self::Agent(agent) => Some(Recipient::Agent(agent)),
            Self::Orchestrator => Some(Recipient::Orchestrator),
            Self::Supervisor => None,
        }
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(agent) => write!(f, "{agent}"),
            Self::Orchestrator => f.write_str("orchestrator"),
            Self::Supervisor => f.write_str("supervisor"),
        }
    }
}

/// Where a routed message is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recipient {
    /// A registered agent.
    Agent(AgentType),
    /// The orchestrator inbox.
    Orchestrator,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(agent) => write!(f, "{agent}"),
            Self::Orchestrator => f.write_str("orchestrator"),
        }
    }
}

/// What a recommendation (and the decision derived from it) is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationCategory {
    /// Something to say or show to the learner.
    Content,
    /// Encouragement, a break, or another corrective step.
    Intervention,
    /// A change to the learning path.
    Strategy,
    /// A change to the difficulty level.
    Difficulty,
    /// Something to raise engagement.
    Engagement,
    /// A UI-level action tag.
    Action,
}

impl RecommendationCategory {
    /// Returns the wire name of the category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Intervention => "intervention",
            Self::Strategy => "strategy",
            Self::Difficulty => "difficulty",
            Self::Engagement => "engagement",
            Self::Action => "action",
        }
    }
}

/// An agent's suggested action, before conflict resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Unique recommendation ID.
    pub id: String,
    /// What the recommendation is about.
    pub category: RecommendationCategory,
    /// Priority band.
    pub priority: Priority,
    /// Human-readable description; also the grouping key for consensus.
    pub description: String,
    /// Category-specific data.
    pub data: serde_json::Value,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

impl Recommendation {
    /// Creates a recommendation with empty data. Confidence is clamped to [0, 1].
    #[must_use]
    pub fn new(
        category: RecommendationCategory,
        priority: Priority,
        description: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: format!("rec-{}", uuid::Uuid::new_v4()),
            category,
            priority,
            description: description.into(),
            data: serde_json::Value::Null,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Attaches category-specific data.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// A recommendation tagged with the agent that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedRecommendation {
    /// Producing agent.
    pub source: AgentType,
    /// The recommendation itself.
    pub recommendation: Recommendation,
}

/// A recommendation (or merge of several) selected for execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    /// Unique decision ID.
    pub id: String,
    /// Category, copied from the winning recommendation(s).
    pub category: RecommendationCategory,
    /// What to do.
    pub action: String,
    /// Category-specific data.
    pub data: serde_json::Value,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

impl Decision {
    /// Builds a decision that adopts a single recommendation as-is.
    #[must_use]
    pub fn from_recommendation(recommendation: &Recommendation) -> Self {
        Self {
            id: format!("dec-{}", uuid::Uuid::new_v4()),
            category: recommendation.category,
            action: recommendation.description.clone(),
            data: recommendation.data.clone(),
            confidence: recommendation.confidence,
        }
    }
}
