//! Agents, routing tables and the self-healing orchestrator.

pub mod agent;
pub mod context;
pub mod error;
pub mod forced;
pub mod orchestrator;
pub mod registry;
pub mod router;
pub mod stage_table;
pub mod stubs;

pub mod test_support;

pub use agent::{Agent, AgentSet};
pub use context::RunContext;
pub use error::{AgentError, OrchestratorError};
pub use forced::{ForcedEffect, ForcedHook, MARKET_FREEZE_DEMO, POLICY_REJECT_DEMO, SLOW_PROCESS_DEMO};
pub use orchestrator::{Orchestrator, PreparedRun};
pub use registry::HistoryStream;
pub use router::{CorrectionRoute, CorrectionRouter, GuardedStep, RouteStep, StepGuard};
pub use stage_table::{StageSpec, StageTable};
pub use stubs::{build_stub_agents, StubAgent};
