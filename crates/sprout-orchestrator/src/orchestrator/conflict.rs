//! Conflict resolution: reduces the recommend stage's output to decisions.

use crate::types::{AgentType, Decision, RecommendationCategory, SourcedRecommendation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Decisions kept by the weighted strategy.
pub const WEIGHTED_TOP_N: usize = 3;

/// Engagement below which interventions get the weighted boost.
pub const LOW_ENGAGEMENT: f64 = 0.5;

const INTERVENTION_BOOST: f64 = 1.5;

/// How competing recommendations become decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// The single highest (priority, confidence) recommendation.
    Priority,
    /// Recommendations two or more agents agree on.
    Consensus,
    /// The top three by confidence scaled by priority.
    #[default]
    Weighted,
}

impl ConflictStrategy {
    /// Returns the configuration name of the strategy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::Consensus => "consensus",
            Self::Weighted => "weighted",
        }
    }

    /// Reduces `recommendations` to decisions.
    ///
    /// # Arguments
    /// * `recommendations` - Output of the recommend stage, tagged by source
    /// * `engagement` - The learner's engagement after the assess stage
    #[must_use]
    pub fn resolve(&self, recommendations: &[SourcedRecommendation], engagement: f64) -> Vec<Decision> {
        let decisions = match self {
            Self::Priority => by_priority(recommendations),
            Self::Consensus => by_consensus(recommendations),
            Self::Weighted => by_weight(recommendations, engagement),
        };
        debug!(
            strategy = self.as_str(),
            recommendations = recommendations.len(),
            decisions = decisions.len(),
            "Recommendations resolved"
        );
        decisions
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "priority" => Ok(Self::Priority),
            "consensus" => Ok(Self::Consensus),
            "weighted" => Ok(Self::Weighted),
            other => Err(format!("unknown conflict strategy: {other}")),
        }
    }
}

fn by_priority(recommendations: &[SourcedRecommendation]) -> Vec<Decision> {
    recommendations
        .iter()
        .map(|s| &s.recommendation)
        .reduce(|best, candidate| {
            let better = candidate.priority > best.priority
                || (candidate.priority == best.priority && candidate.confidence > best.confidence);
            if better { candidate } else { best }
        })
        .map(Decision::from_recommendation)
        .into_iter()
        .collect()
}

struct ConsensusGroup<'a> {
    category: RecommendationCategory,
    description: &'a str,
    members: Vec<&'a SourcedRecommendation>,
}

impl ConsensusGroup<'_> {
    fn agents(&self) -> BTreeSet<AgentType> {
        self.members.iter().map(|m| m.source).collect()
    }
}

fn by_consensus(recommendations: &[SourcedRecommendation]) -> Vec<Decision> {
    // Groups keep first-seen order so decisions come out deterministically.
    let mut groups: Vec<ConsensusGroup<'_>> = Vec::new();
    for sourced in recommendations {
        let rec = &sourced.recommendation;
        match groups.iter_mut().find(|g| g.category == rec.category && g.description == rec.description) {
            Some(group) => group.members.push(sourced),
            None => groups.push(ConsensusGroup {
                category: rec.category,
                description: &rec.description,
                members: vec![sourced],
            }),
        }
    }

    groups
        .into_iter()
        .filter(|group| group.agents().len() >= 2)
        .filter_map(|group| {
            let first = group.members.first()?;
            let total: f64 = group.members.iter().map(|m| m.recommendation.confidence).sum();
            let mut decision = Decision::from_recommendation(&first.recommendation);
            decision.confidence = total / group.members.len() as f64;
            Some(decision)
        })
        .collect()
}

/// Weighted score of one recommendation.
#[must_use]
pub fn weighted_score(sourced: &SourcedRecommendation, engagement: f64) -> f64 {
    let rec = &sourced.recommendation;
    let mut score = rec.confidence * f64::from(rec.priority.value()) / 4.0;
    if rec.category == RecommendationCategory::Intervention && engagement < LOW_ENGAGEMENT {
        score *= INTERVENTION_BOOST;
    }
    score
}

fn by_weight(recommendations: &[SourcedRecommendation], engagement: f64) -> Vec<Decision> {
    let mut scored: Vec<(f64, &SourcedRecommendation)> =
        recommendations.iter().map(|s| (weighted_score(s, engagement), s)).collect();
    // Stable sort: equal scores keep arrival order.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(WEIGHTED_TOP_N)
        .map(|(_, s)| Decision::from_recommendation(&s.recommendation))
        .collect()
}
