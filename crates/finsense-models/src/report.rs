use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agent_message::{AgentRole, Fill};
use crate::status::{CorrectionKind, FailureClass, Stage, StatusCode, WorkflowState};

/// One appended record of a run's history. Strictly ordered by `sequence`
/// and `recorded_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub sequence: u32,
    pub stage: Stage,
    /// State the machine was in when the entry was recorded.
    pub state: WorkflowState,
    /// Agent that produced `status`, `None` for pure state transitions.
    pub agent: Option<AgentRole>,
    pub status: StatusCode,
    pub recorded_at: DateTime<Utc>,
}

/// Element of `WorkflowReport::path_taken`.
///
/// Serialized as the display string (`"FETCH"`, `"CORRECTING(MARKET)"`,
/// `"LIQUIDATION"`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "String", try_from = "String")]
pub enum PathStep {
    Stage(Stage),
    Correcting(CorrectionKind),
    Liquidation,
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Stage(stage) => write!(f, "{stage}"),
            PathStep::Correcting(kind) => write!(f, "CORRECTING({kind})"),
            PathStep::Liquidation => f.write_str("LIQUIDATION"),
        }
    }
}

impl From<PathStep> for String {
    fn from(step: PathStep) -> Self {
        step.to_string()
    }
}

impl FromStr for PathStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let step = match s {
            "FETCH" => PathStep::Stage(Stage::Fetch),
            "VALUATE" => PathStep::Stage(Stage::Valuate),
            "RISK_CHECK" => PathStep::Stage(Stage::RiskCheck),
            "EXECUTE" => PathStep::Stage(Stage::Execute),
            "CORRECTING(STRATEGIC)" => PathStep::Correcting(CorrectionKind::Strategic),
            "CORRECTING(MARKET)" => PathStep::Correcting(CorrectionKind::Market),
            "CORRECTING(PROCESS)" => PathStep::Correcting(CorrectionKind::Process),
            "LIQUIDATION" => PathStep::Liquidation,
            other => return Err(format!("unknown path step: {other}")),
        };
        Ok(step)
    }
}

impl TryFrom<String> for PathStep {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Success,
    Failed,
}

/// Distinguishes a clean success from a corrected one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Straight through the pipeline, no corrections.
    Clean,
    /// Completed after at least one correction route.
    Corrected,
    /// Completed by liquidating; the planned trade was not executed.
    Liquidated,
    Failed,
}

/// Why a run ended in `FAILED`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// A pipeline agent returned `FATAL`.
    AgentFatal,
    /// No correction route is registered for the (stage, status) pair.
    Unrouted,
    /// The route exists but its bounded attempts are spent.
    AttemptsExhausted,
    /// A correction step returned something other than `SUCCESS`.
    CorrectionStepFailed,
    /// A successful agent returned a payload the orchestrator could not fold.
    MalformedPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureDetail {
    pub stage: Stage,
    pub status: StatusCode,
    pub class: FailureClass,
    pub cause: FailureCause,
    /// Agent whose result ended the run, if any.
    pub agent: Option<AgentRole>,
    pub reason: String,
}

/// Terminal summary of one run. Produced once; deterministic for a given
/// ticker and agent set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowReport {
    pub ticker: String,
    pub final_status: FinalStatus,
    pub outcome: Outcome,
    pub path_taken: Vec<PathStep>,
    pub degraded_mode: bool,
    pub trade_size_initial: Decimal,
    pub trade_size_final: Decimal,
    pub correction_counts: BTreeMap<Stage, u32>,
    pub duration_total_ms: u64,
    /// Order placed at EXECUTE. `None` for liquidations and failures.
    pub fill: Option<Fill>,
    pub failure: Option<FailureDetail>,
}

impl WorkflowReport {
    pub fn is_success(&self) -> bool {
        self.final_status == FinalStatus::Success
    }

    pub fn corrections(&self, stage: Stage) -> u32 {
        self.correction_counts.get(&stage).copied().unwrap_or(0)
    }

    pub fn visited(&self, step: PathStep) -> bool {
        self.path_taken.contains(&step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_report() -> WorkflowReport {
        WorkflowReport {
            ticker: "MARKET_FREEZE_DEMO".to_string(),
            final_status: FinalStatus::Success,
            outcome: Outcome::Liquidated,
            path_taken: vec![
                PathStep::Stage(Stage::Fetch),
                PathStep::Correcting(CorrectionKind::Market),
                PathStep::Liquidation,
            ],
            degraded_mode: false,
            trade_size_initial: dec!(500),
            trade_size_final: dec!(500),
            correction_counts: BTreeMap::from([(Stage::Fetch, 1)]),
            duration_total_ms: 1030,
            fill: None,
            failure: None,
        }
    }

    #[test]
    fn roundtrip_report() {
        let report = sample_report();
        let json = serde_json::to_string(&report).unwrap();
        let deserialized: WorkflowReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, deserialized);
    }

    #[test]
    fn path_steps_serialize_as_labels() {
        let json = serde_json::to_value(&sample_report().path_taken).unwrap();
        assert_eq!(
            json,
            serde_json::json!(["FETCH", "CORRECTING(MARKET)", "LIQUIDATION"])
        );
    }

    #[test]
    fn unknown_path_step_rejected() {
        let result: Result<PathStep, _> = serde_json::from_str("\"CORRECTING(NOPE)\"");
        assert!(result.is_err());
    }

    #[test]
    fn correction_counts_default_to_zero() {
        let report = sample_report();
        assert_eq!(report.corrections(Stage::Fetch), 1);
        assert_eq!(report.corrections(Stage::RiskCheck), 0);
        assert!(report.visited(PathStep::Liquidation));
        assert!(!report.visited(PathStep::Stage(Stage::Execute)));
    }
}
