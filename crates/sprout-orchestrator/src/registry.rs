//! Agent registry for managing registered agents.
//!
//! Agents are kept in registration order. The registry also records which
//! agent types are degraded, so requests to them can fail fast.

use crate::agent::Agent;
use crate::error::{OrchestrationError, Result};
use crate::types::AgentType;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Registry for managing agents.
pub struct AgentRegistry {
    /// Agents in registration order.
    agents: RwLock<Vec<Arc<dyn Agent>>>,
    /// Agent types running on a fallback.
    degraded: RwLock<HashSet<AgentType>>,
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agent_count", &self.agents.try_read().map(|a| a.len()).unwrap_or(0))
            .field("degraded_count", &self.degraded.try_read().map(|d| d.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl AgentRegistry {
    /// Creates a new empty agent registry.
    #[must_use]
    pub fn new() -> Self {
        Self { agents: RwLock::new(Vec::new()), degraded: RwLock::new(HashSet::new()) }
    }

    /// Registers an agent.
    ///
    /// # Errors
    /// Returns `DuplicateAgent` if an agent of the same type is registered.
    pub async fn register(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let agent_type = agent.agent_type();
        debug!(agent = %agent_type, "Registering agent");

        let mut agents = self.agents.write().await;
        if agents.iter().any(|a| a.agent_type() == agent_type) {
            return Err(OrchestrationError::DuplicateAgent(agent_type));
        }
        agents.push(agent);
        Ok(())
    }

    /// Retrieves an agent by type.
    pub async fn get(&self, agent_type: AgentType) -> Option<Arc<dyn Agent>> {
        self.agents.read().await.iter().find(|a| a.agent_type() == agent_type).cloned()
    }

    /// All agents in registration order.
    pub async fn agents(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.read().await.clone()
    }

    /// Registered agent types in registration order.
    pub async fn agent_types(&self) -> Vec<AgentType> {
        self.agents.read().await.iter().map(|a| a.agent_type()).collect()
    }

    /// Checks if an agent type is registered.
    pub async fn is_registered(&self, agent_type: AgentType) -> bool {
        self.agents.read().await.iter().any(|a| a.agent_type() == agent_type)
    }

    /// Returns the number of registered agents.
    pub async fn count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Marks an agent type as degraded or restores it.
    pub async fn set_degraded(&self, agent_type: AgentType, degraded: bool) {
        let mut set = self.degraded.write().await;
        let changed = if degraded { set.insert(agent_type) } else { set.remove(&agent_type) };
        if changed {
            info!(agent = %agent_type, degraded, "Agent degradation flag changed");
        }
    }

    /// Checks if an agent type is degraded.
    pub async fn is_degraded(&self, agent_type: AgentType) -> bool {
        self.degraded.read().await.contains(&agent_type)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAgent;

    #[tokio::test]
    async fn test_register_keeps_order() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(ScriptedAgent::new(AgentType::Game))).await.unwrap();
        registry.register(Arc::new(ScriptedAgent::new(AgentType::Assessment))).await.unwrap();

        assert_eq!(registry.agent_types().await, vec![AgentType::Game, AgentType::Assessment]);
        assert_eq!(registry.count().await, 2);
        assert!(registry.get(AgentType::Assessment).await.is_some());
        assert!(registry.get(AgentType::Reflection).await.is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_fails() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(ScriptedAgent::new(AgentType::Game))).await.unwrap();
        let err = registry.register(Arc::new(ScriptedAgent::new(AgentType::Game))).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::DuplicateAgent(AgentType::Game)));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_degraded_flag() {
        let registry = AgentRegistry::new();
        assert!(!registry.is_degraded(AgentType::Assessment).await);
        registry.set_degraded(AgentType::Assessment, true).await;
        assert!(registry.is_degraded(AgentType::Assessment).await);
        registry.set_degraded(AgentType::Assessment, false).await;
        assert!(!registry.is_degraded(AgentType::Assessment).await);
    }
}
