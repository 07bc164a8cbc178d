//! Learner-keyed store of learning states.
//!
//! Each learner gets its own async mutex. Holding it across the whole
//! interaction pipeline serializes one learner's interactions while other
//! learners proceed in parallel.

use crate::state::{LearnerProfile, LearningState};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Shared handle to one learner's state.
pub type LearnerSlot = Arc<Mutex<LearningState>>;

/// Store of learning states keyed by learner ID.
pub struct LearningStateStore {
    learners: RwLock<HashMap<String, LearnerSlot>>,
}

impl fmt::Debug for LearningStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearningStateStore")
            .field("learner_count", &self.learners.try_read().map(|l| l.len()).unwrap_or(0))
            .finish()
    }
}

impl LearningStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { learners: RwLock::new(HashMap::new()) }
    }

    /// Creates a fresh state for `learner_id`, replacing any prior one.
    ///
    /// A learner that already has a slot keeps it; only its contents are
    /// replaced, after any in-flight interaction releases the lock.
    pub async fn initialize(&self, learner_id: &str, profile: LearnerProfile) -> LearningState {
        let fresh = LearningState::new(learner_id, profile);

        let existing = self.learners.read().await.get(learner_id).cloned();
        if let Some(slot) = existing {
            *slot.lock().await = fresh.clone();
            return fresh;
        }

        let mut learners = self.learners.write().await;
        match learners.get(learner_id) {
            Some(slot) => *slot.lock().await = fresh.clone(),
            None => {
                learners.insert(learner_id.to_string(), Arc::new(Mutex::new(fresh.clone())));
            }
        }
        fresh
    }

    /// Returns the slot for `learner_id`, if the learner was initialized.
    pub async fn slot(&self, learner_id: &str) -> Option<LearnerSlot> {
        self.learners.read().await.get(learner_id).cloned()
    }

    /// Returns a snapshot of the learner's state.
    pub async fn snapshot(&self, learner_id: &str) -> Option<LearningState> {
        let slot = self.slot(learner_id).await?;
        let state = slot.lock().await;
        Some(state.clone())
    }

    /// IDs of all initialized learners, sorted.
    pub async fn learner_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.learners.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of initialized learners.
    pub async fn len(&self) -> usize {
        self.learners.read().await.len()
    }

    /// True when no learner was initialized.
    pub async fn is_empty(&self) -> bool {
        self.learners.read().await.is_empty()
    }
}

impl Default for LearningStateStore {
    fn default() -> Self {
        Self::new()
    }
}
