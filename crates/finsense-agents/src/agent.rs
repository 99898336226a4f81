use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use finsense_models::{AgentOutcome, AgentRequest, AgentRole};

use crate::error::{AgentError, OrchestratorError};

/// A stateless unit of pipeline work. Mockable for testing.
///
/// Implementations must not hold per-run state: everything they know about
/// the run arrives in the request, and everything they want to change leaves
/// in the outcome's payload.
#[async_trait]
pub trait Agent: Send + Sync {
    fn role(&self) -> AgentRole;

    fn name(&self) -> &str {
        self.role().as_str()
    }

    async fn execute(&self, request: &AgentRequest) -> Result<AgentOutcome, AgentError>;
}

/// Registry of agents by role, shared read-only by every run.
#[derive(Clone, Default)]
pub struct AgentSet {
    agents: HashMap<AgentRole, Arc<dyn Agent>>,
}

impl AgentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its own role, replacing any previous one.
    pub fn insert(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.role(), agent);
    }

    pub fn with(mut self, agent: Arc<dyn Agent>) -> Self {
        self.insert(agent);
        self
    }

    pub fn get(&self, role: AgentRole) -> Option<&Arc<dyn Agent>> {
        self.agents.get(&role)
    }

    pub fn require(&self, role: AgentRole) -> Result<&Arc<dyn Agent>, OrchestratorError> {
        self.get(role).ok_or(OrchestratorError::MissingAgent(role))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
