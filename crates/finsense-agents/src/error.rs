use finsense_models::{AgentRole, Stage, StatusCode};
use thiserror::Error;
use uuid::Uuid;

/// Unexpected agent faults. Expected domain conditions are statuses, not errors;
/// the orchestrator turns any of these into a `FATAL` result.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent {agent} cannot proceed: {reason}")]
    Unavailable { agent: AgentRole, reason: String },

    #[error("Agent {agent} is missing input: {field}")]
    MissingInput {
        agent: AgentRole,
        field: &'static str,
    },

    #[error("Agent {agent} returned no `{key}` payload")]
    MissingPayload { agent: AgentRole, key: &'static str },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No agent registered for role {0}")]
    MissingAgent(AgentRole),

    #[error("Invalid correction route for ({stage}, {status}): {reason}")]
    InvalidRoute {
        stage: Stage,
        status: StatusCode,
        reason: String,
    },

    #[error("Run {0} is not active (unknown or already finished)")]
    RunNotActive(Uuid),

    #[error("Run registry unavailable: {0}")]
    Registry(String),
}
