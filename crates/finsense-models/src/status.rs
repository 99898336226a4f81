use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of a single agent invocation. Exactly one per call, never partial.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Success,
    PolicyReject,
    MarketFreeze,
    ProcessSlow,
    Fatal,
}

impl StatusCode {
    pub const ALL: [StatusCode; 5] = [
        StatusCode::Success,
        StatusCode::PolicyReject,
        StatusCode::MarketFreeze,
        StatusCode::ProcessSlow,
        StatusCode::Fatal,
    ];

    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }

    /// Failure class this status belongs to. `None` for `Success`.
    pub fn failure_class(self) -> Option<FailureClass> {
        match self {
            StatusCode::Success => None,
            StatusCode::PolicyReject => Some(FailureClass::PolicyViolation),
            StatusCode::MarketFreeze => Some(FailureClass::MarketAnomaly),
            StatusCode::ProcessSlow => Some(FailureClass::LatencyViolation),
            StatusCode::Fatal => Some(FailureClass::FatalFailure),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Success => "SUCCESS",
            StatusCode::PolicyReject => "POLICY_REJECT",
            StatusCode::MarketFreeze => "MARKET_FREEZE",
            StatusCode::ProcessSlow => "PROCESS_SLOW",
            StatusCode::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy for non-success statuses.
///
/// The first three are recoverable through a correction route; `FatalFailure`
/// always terminates the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    PolicyViolation,
    MarketAnomaly,
    LatencyViolation,
    FatalFailure,
}

/// Ordered position in the primary pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Fetch,
    Valuate,
    RiskCheck,
    Execute,
}

impl Stage {
    /// Pipeline order.
    pub const PIPELINE: [Stage; 4] = [Stage::Fetch, Stage::Valuate, Stage::RiskCheck, Stage::Execute];

    pub fn first() -> Stage {
        Stage::Fetch
    }

    /// The stage after this one, or `None` after `Execute`.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Fetch => Some(Stage::Valuate),
            Stage::Valuate => Some(Stage::RiskCheck),
            Stage::RiskCheck => Some(Stage::Execute),
            Stage::Execute => None,
        }
    }

    /// The orchestrator state in which this stage's agent runs.
    pub fn working_state(self) -> WorkflowState {
        match self {
            Stage::Fetch => WorkflowState::Fetching,
            Stage::Valuate => WorkflowState::Valuating,
            Stage::RiskCheck => WorkflowState::RiskChecking,
            Stage::Execute => WorkflowState::Executing,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetch => "FETCH",
            Stage::Valuate => "VALUATE",
            Stage::RiskCheck => "RISK_CHECK",
            Stage::Execute => "EXECUTE",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which family of correction is running.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectionKind {
    /// Policy reject -> resize and resubmit.
    Strategic,
    /// Market freeze -> news triage -> liquidate or fall back.
    Market,
    /// Latency violation -> degraded substitute agent.
    Process,
}

impl fmt::Display for CorrectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CorrectionKind::Strategic => "STRATEGIC",
            CorrectionKind::Market => "MARKET",
            CorrectionKind::Process => "PROCESS",
        })
    }
}

/// Orchestrator state machine states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Fetching,
    Valuating,
    RiskChecking,
    Executing,
    Correcting(CorrectionKind),
    Completed,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Fetching => f.write_str("FETCHING"),
            WorkflowState::Valuating => f.write_str("VALUATING"),
            WorkflowState::RiskChecking => f.write_str("RISK_CHECKING"),
            WorkflowState::Executing => f.write_str("EXECUTING"),
            WorkflowState::Correcting(kind) => write!(f, "CORRECTING({kind})"),
            WorkflowState::Completed => f.write_str("COMPLETED"),
            WorkflowState::Failed => f.write_str("FAILED"),
        }
    }
}

/// Ternary verdict produced by news analysis during a market correction.
/// Carried in the payload, never as a pipeline status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NewsVerdict {
    /// Fundamental change (black swan). Liquidate.
    Crisis,
    /// Temporary noise. Retry through the fallback feed.
    Glitch,
    Inconclusive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_order_walks_to_execute() {
        let mut stage = Stage::first();
        let mut walked = vec![stage];
        while let Some(next) = stage.next() {
            walked.push(next);
            stage = next;
        }
        assert_eq!(walked, Stage::PIPELINE.to_vec());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&StatusCode::PolicyReject).unwrap(),
            "\"POLICY_REJECT\""
        );
        assert_eq!(
            serde_json::to_string(&Stage::RiskCheck).unwrap(),
            "\"RISK_CHECK\""
        );
        assert_eq!(StatusCode::MarketFreeze.to_string(), "MARKET_FREEZE");
    }

    #[test]
    fn only_success_has_no_failure_class() {
        for status in StatusCode::ALL {
            assert_eq!(status.failure_class().is_none(), status.is_success());
        }
        assert_eq!(
            StatusCode::ProcessSlow.failure_class(),
            Some(FailureClass::LatencyViolation)
        );
    }

    #[test]
    fn correcting_state_display() {
        assert_eq!(
            WorkflowState::Correcting(CorrectionKind::Market).to_string(),
            "CORRECTING(MARKET)"
        );
        assert!(WorkflowState::Failed.is_terminal());
        assert!(!WorkflowState::Correcting(CorrectionKind::Process).is_terminal());
    }
}
