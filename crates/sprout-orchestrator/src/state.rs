//! Per-learner session state and the patches that mutate it.
//!
//! A [`LearningState`] is only ever changed by applying a [`StatePatch`].
//! Every level field is clamped to [0, 1] on application, and the history
//! buffers are bounded, so a state built by [`LearningState::new`] stays
//! well formed under any sequence of patches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Engagement samples kept per learner.
pub const MAX_ENGAGEMENT_HISTORY: usize = 50;

/// Context entries kept per learner.
pub const MAX_CONTEXT_HISTORY: usize = 20;

const MIN_ATTENTION_MINUTES: u32 = 5;
const MAX_ATTENTION_MINUTES: u32 = 30;
const MINUTES_PER_YEAR_OF_AGE: u32 = 2;

/// Weight of the previous mastery value when folding in a new reading.
const MASTERY_RETENTION: f64 = 0.7;

/// Comprehension at or above which a demonstrated concept stops being a gap.
const GAP_RESOLVED_AT: f64 = 0.8;

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Who the learner is. Drives initial objectives and engagement defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerProfile {
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: u8,
    /// School grade, if known.
    pub grade_level: Option<u8>,
    /// Topics the learner likes.
    pub interests: Vec<String>,
    /// Explicit attention span in minutes.
    pub attention_span_minutes: Option<u32>,
    /// Goals that seed the learning objectives.
    pub learning_goals: Vec<String>,
}

impl LearnerProfile {
    /// Creates a profile with no goals or interests.
    #[must_use]
    pub fn new(name: impl Into<String>, age: u8) -> Self {
        Self {
            name: name.into(),
            age,
            grade_level: None,
            interests: Vec::new(),
            attention_span_minutes: None,
            learning_goals: Vec::new(),
        }
    }

    /// Sets the learning goals.
    #[must_use]
    pub fn with_goals<I, S>(mut self, goals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.learning_goals = goals.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the interests.
    #[must_use]
    pub fn with_interests<I, S>(mut self, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interests = interests.into_iter().map(Into::into).collect();
        self
    }

    /// Sets an explicit attention span.
    #[must_use]
    pub const fn with_attention_span(mut self, minutes: u32) -> Self {
        self.attention_span_minutes = Some(minutes);
        self
    }

    /// Attention span in minutes: the explicit value, or 2 minutes per year
    /// of age clamped to 5..=30.
    pub fn attention_span(&self) -> u32 {
        self.attention_span_minutes.unwrap_or_else(|| {
            (u32::from(self.age) * MINUTES_PER_YEAR_OF_AGE)
                .clamp(MIN_ATTENTION_MINUTES, MAX_ATTENTION_MINUTES)
        })
    }
}

/// Kind of learner input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    /// Free chat.
    #[default]
    Chat,
    /// The learner asks something.
    Question,
    /// The learner answers an exercise.
    Answer,
    /// Input from a learning game.
    Game,
}

/// One learner input entering the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentInteraction {
    /// What the learner wrote.
    pub content: String,
    /// Kind of input.
    pub kind: InteractionKind,
    /// Topic the input is about, if known.
    pub topic: Option<String>,
    /// Whether an answer was correct.
    pub correct: Option<bool>,
    /// Time the learner took to respond.
    pub response_time_ms: Option<u64>,
    /// When the input was received.
    pub timestamp: DateTime<Utc>,
}

impl StudentInteraction {
    /// Creates a chat interaction.
    #[must_use]
    pub fn chat(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: InteractionKind::Chat,
            topic: None,
            correct: None,
            response_time_ms: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a graded answer.
    #[must_use]
    pub fn answer(content: impl Into<String>, correct: bool) -> Self {
        Self { kind: InteractionKind::Answer, correct: Some(correct), ..Self::chat(content) }
    }

    /// Sets the interaction kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: InteractionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the topic.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the response time.
    #[must_use]
    pub fn with_response_time(mut self, response_time: Duration) -> Self {
        self.response_time_ms = Some(u64::try_from(response_time.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// Result of assessing one interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// How well the learner understood, in [0, 1].
    pub comprehension: f64,
    /// How engaged the learner is, in [0, 1].
    pub engagement: f64,
    /// How frustrated the learner is, in [0, 1].
    pub frustration: f64,
    /// Concepts the learner worked with.
    pub concepts_demonstrated: Vec<String>,
    /// Suspected misconceptions; become knowledge gaps.
    pub misconceptions: Vec<String>,
    /// Set when the assessor wants an intervention regardless of scores.
    pub needs_intervention: bool,
}

impl Default for Assessment {
    fn default() -> Self {
        Self {
            comprehension: 0.5,
            engagement: 0.5,
            frustration: 0.0,
            concepts_demonstrated: Vec::new(),
            misconceptions: Vec::new(),
            needs_intervention: false,
        }
    }
}

/// Mastery per concept plus known gaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptMap {
    /// Concept to mastery in [0, 1].
    pub mastery: BTreeMap<String, f64>,
    /// Concept to related concepts.
    pub relationships: BTreeMap<String, Vec<String>>,
    /// Concepts the learner is known to struggle with.
    pub gaps: Vec<String>,
}

impl ConceptMap {
    /// Mastery of `concept`, 0 when unseen.
    pub fn mastery_of(&self, concept: &str) -> f64 {
        self.mastery.get(concept).copied().unwrap_or(0.0)
    }

    /// The concept with the lowest mastery, if any.
    pub fn weakest(&self) -> Option<(&str, f64)> {
        self.mastery
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(concept, mastery)| (concept.as_str(), *mastery))
    }

    /// Concepts ordered from least to most mastered.
    pub fn by_mastery(&self) -> Vec<(&str, f64)> {
        let mut concepts: Vec<_> = self.mastery.iter().map(|(c, m)| (c.as_str(), *m)).collect();
        concepts.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        concepts
    }
}

/// One engagement reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementSample {
    /// When it was taken.
    pub timestamp: DateTime<Utc>,
    /// Engagement in [0, 1].
    pub engagement: f64,
    /// Frustration in [0, 1].
    pub frustration: f64,
}

/// Engagement levels and their recent history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementData {
    /// Current engagement in [0, 1].
    pub current_engagement: f64,
    /// Attention span in minutes.
    pub attention_span_minutes: u32,
    /// Current frustration in [0, 1].
    pub frustration_level: f64,
    /// Current motivation in [0, 1].
    pub motivation_level: f64,
    /// Most recent readings, oldest first.
    pub history: VecDeque<EngagementSample>,
}

/// A partial engagement update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementReading {
    /// New engagement.
    pub engagement: f64,
    /// New frustration.
    pub frustration: f64,
    /// New motivation, if measured.
    pub motivation: Option<f64>,
}

/// One exchange kept for conversational context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// When the exchange happened.
    pub timestamp: DateTime<Utc>,
    /// What the learner wrote.
    pub learner_message: String,
    /// What the tutor answered.
    pub response: String,
}

/// Per-learner session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    /// Learner this state belongs to.
    pub learner_id: String,
    /// Session ID, new on every initialization.
    pub session_id: String,
    /// Profile the state was initialized from.
    pub profile: LearnerProfile,
    /// Current learning objectives, in order.
    pub objectives: Vec<String>,
    /// Mastery and gaps.
    pub concept_map: ConceptMap,
    /// Engagement levels.
    pub engagement: EngagementData,
    /// Difficulty level in [0, 1].
    pub difficulty_level: f64,
    /// Upcoming concepts, in order.
    pub learning_path: Vec<String>,
    /// Recent exchanges, oldest first.
    pub context_history: VecDeque<ContextEntry>,
    /// Bumped on every patch.
    pub last_updated: DateTime<Utc>,
}

impl LearningState {
    /// Creates a fresh state for `learner_id` with defaults derived from `profile`.
    #[must_use]
    pub fn new(learner_id: impl Into<String>, profile: LearnerProfile) -> Self {
        let engagement = EngagementData {
            current_engagement: 0.7,
            attention_span_minutes: profile.attention_span(),
            frustration_level: 0.0,
            motivation_level: 0.7,
            history: VecDeque::new(),
        };

        Self {
            learner_id: learner_id.into(),
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            objectives: profile.learning_goals.clone(),
            learning_path: profile.learning_goals.clone(),
            profile,
            concept_map: ConceptMap::default(),
            engagement,
            difficulty_level: 0.5,
            context_history: VecDeque::new(),
            last_updated: Utc::now(),
        }
    }

    /// Applies a patch and bumps `last_updated`.
    pub fn apply(&mut self, patch: &StatePatch) {
        if let Some(reading) = patch.engagement {
            let engagement = &mut self.engagement;
            engagement.current_engagement = clamp_unit(reading.engagement);
            engagement.frustration_level = clamp_unit(reading.frustration);
            if let Some(motivation) = reading.motivation {
                engagement.motivation_level = clamp_unit(motivation);
            }
            engagement.history.push_back(EngagementSample {
                timestamp: Utc::now(),
                engagement: engagement.current_engagement,
                frustration: engagement.frustration_level,
            });
            while engagement.history.len() > MAX_ENGAGEMENT_HISTORY {
                engagement.history.pop_front();
            }
        }

        for (concept, mastery) in &patch.mastery_updates {
            self.concept_map.mastery.insert(concept.clone(), clamp_unit(*mastery));
        }

        for gap in &patch.new_gaps {
            if !self.concept_map.gaps.contains(gap) {
                self.concept_map.gaps.push(gap.clone());
            }
        }
        self.concept_map.gaps.retain(|gap| !patch.resolved_gaps.contains(gap));

        if let Some(objectives) = &patch.objectives {
            self.objectives.clone_from(objectives);
        }

        for concept in &patch.path_additions {
            if !self.learning_path.contains(concept) {
                self.learning_path.push(concept.clone());
            }
        }

        if let Some(difficulty) = patch.difficulty {
            self.difficulty_level = clamp_unit(difficulty);
        }

        if let Some(entry) = &patch.context_entry {
            self.context_history.push_back(entry.clone());
            while self.context_history.len() > MAX_CONTEXT_HISTORY {
                self.context_history.pop_front();
            }
        }

        self.last_updated = Utc::now();
    }
}

/// A set of changes to a [`LearningState`].
///
/// Patches merge: later optional values win and list values append.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    /// New engagement reading.
    pub engagement: Option<EngagementReading>,
    /// Concept to new mastery.
    pub mastery_updates: BTreeMap<String, f64>,
    /// Gaps to add.
    pub new_gaps: Vec<String>,
    /// Gaps to remove.
    pub resolved_gaps: Vec<String>,
    /// Replacement objectives.
    pub objectives: Option<Vec<String>>,
    /// Concepts appended to the learning path.
    pub path_additions: Vec<String>,
    /// New difficulty level.
    pub difficulty: Option<f64>,
    /// Exchange to remember.
    pub context_entry: Option<ContextEntry>,
}

impl StatePatch {
    /// Folds an assessment into a patch against the current state.
    ///
    /// Demonstrated concepts move their mastery toward the comprehension
    /// score, misconceptions become gaps, and well-understood concepts stop
    /// being gaps.
    #[must_use]
    pub fn from_assessment(assessment: &Assessment, state: &LearningState) -> Self {
        let mut patch = Self {
            engagement: Some(EngagementReading {
                engagement: assessment.engagement,
                frustration: assessment.frustration,
                motivation: None,
            }),
            new_gaps: assessment.misconceptions.clone(),
            ..Self::default()
        };

        for concept in &assessment.concepts_demonstrated {
            let previous = state.concept_map.mastery.get(concept).copied();
            let updated = previous.map_or(assessment.comprehension, |m| {
                m.mul_add(MASTERY_RETENTION, assessment.comprehension * (1.0 - MASTERY_RETENTION))
            });
            patch.mastery_updates.insert(concept.clone(), updated);
            if assessment.comprehension >= GAP_RESOLVED_AT {
                patch.resolved_gaps.push(concept.clone());
            }
        }

        patch
    }

    /// Merges `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        if other.engagement.is_some() {
            self.engagement = other.engagement;
        }
        self.mastery_updates.extend(other.mastery_updates);
        self.new_gaps.extend(other.new_gaps);
        self.resolved_gaps.extend(other.resolved_gaps);
        if other.objectives.is_some() {
            self.objectives = other.objectives;
        }
        self.path_additions.extend(other.path_additions);
        if other.difficulty.is_some() {
            self.difficulty = other.difficulty;
        }
        if other.context_entry.is_some() {
            self.context_entry = other.context_entry;
        }
    }

    /// True when applying the patch would change nothing but the timestamp.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
