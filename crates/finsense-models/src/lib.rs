pub mod agent_message;
pub mod config;
pub mod report;
pub mod status;

pub use agent_message::{
    AgentOutcome, AgentRequest, AgentRole, Fill, NewsAssessment, Payload, Quote, Recommendation,
    RiskAssessment, SizeAdjustment, Valuation, ValuationMethod,
};
pub use config::{AgentsConfig, CorrectionLimits, FinsenseConfig, PipelineConfig, StageBudgets};
pub use report::{
    FailureCause, FailureDetail, FinalStatus, HistoryEntry, Outcome, PathStep, WorkflowReport,
};
pub use status::{CorrectionKind, FailureClass, NewsVerdict, Stage, StatusCode, WorkflowState};
