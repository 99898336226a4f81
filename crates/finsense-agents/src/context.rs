use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use finsense_models::agent_message::keys;
use finsense_models::{
    AgentOutcome, AgentRequest, AgentRole, FailureDetail, FinalStatus, Fill, HistoryEntry,
    NewsAssessment, NewsVerdict, Outcome, PathStep, Quote, RiskAssessment, SizeAdjustment, Stage,
    StatusCode, Valuation, WorkflowReport, WorkflowState,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::AgentError;

/// Mutable state of exactly one run, owned by the orchestrator task driving it.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    ticker: String,
    trade_size_initial: Decimal,
    trade_size: Decimal,
    notional_limit: Decimal,
    quote: Option<Quote>,
    valuation: Option<Valuation>,
    verdict: Option<NewsVerdict>,
    fill: Option<Fill>,
    risk_flags: BTreeSet<String>,
    degraded_mode: bool,
    correction_counts: BTreeMap<Stage, u32>,
    history: Vec<HistoryEntry>,
    path: Vec<PathStep>,
    elapsed: Duration,
}

impl RunContext {
    pub fn new(run_id: Uuid, ticker: String, trade_size: Decimal, notional_limit: Decimal) -> Self {
        Self {
            run_id,
            ticker,
            trade_size_initial: trade_size,
            trade_size,
            notional_limit,
            quote: None,
            valuation: None,
            verdict: None,
            fill: None,
            risk_flags: BTreeSet::new(),
            degraded_mode: false,
            correction_counts: BTreeMap::new(),
            history: Vec::new(),
            path: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn trade_size(&self) -> Decimal {
        self.trade_size
    }

    pub fn degraded_mode(&self) -> bool {
        self.degraded_mode
    }

    pub fn verdict(&self) -> Option<NewsVerdict> {
        self.verdict
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn path(&self) -> &[PathStep] {
        &self.path
    }

    pub fn correction_count(&self, stage: Stage) -> u32 {
        self.correction_counts.get(&stage).copied().unwrap_or(0)
    }

    /// Read-only projection for an agent serving `stage`.
    pub fn request(&self, role: AgentRole, stage: Stage) -> AgentRequest {
        AgentRequest {
            run_id: self.run_id,
            role,
            stage,
            ticker: self.ticker.clone(),
            trade_size: self.trade_size,
            notional_limit: self.notional_limit,
            quote: self.quote.clone(),
            valuation: self.valuation.clone(),
            verdict: self.verdict,
            risk_flags: self.risk_flags.clone(),
            degraded_mode: self.degraded_mode,
            attempt: self.correction_count(stage),
        }
    }

    /// Append a history entry. Timestamps are kept strictly increasing even
    /// when the clock does not advance between two appends.
    pub fn record(
        &mut self,
        stage: Stage,
        state: WorkflowState,
        agent: Option<AgentRole>,
        status: StatusCode,
    ) -> &HistoryEntry {
        let recorded_at = self.next_timestamp(Utc::now());
        let entry = HistoryEntry {
            sequence: self.history.len() as u32,
            stage,
            state,
            agent,
            status,
            recorded_at,
        };
        self.history.push(entry);
        &self.history[self.history.len() - 1]
    }

    fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.history.last() {
            Some(last) if now <= last.recorded_at => {
                last.recorded_at + chrono::Duration::microseconds(1)
            }
            _ => now,
        }
    }

    pub fn visit(&mut self, step: PathStep) {
        self.path.push(step);
    }

    pub fn add_latency(&mut self, latency: Duration) {
        self.elapsed += latency;
    }

    /// Spend one correction on `stage`, returning the new count.
    pub fn bump_correction(&mut self, stage: Stage) -> u32 {
        let count = self.correction_counts.entry(stage).or_insert(0);
        *count += 1;
        *count
    }

    pub fn enter_degraded_mode(&mut self) {
        self.degraded_mode = true;
        self.risk_flags.insert("degraded_mode".to_string());
    }

    /// Forget the verdict of a previous market correction.
    pub fn clear_verdict(&mut self) {
        self.verdict = None;
    }

    /// Fold a successful agent's payload into the context.
    ///
    /// Each role has one payload key it must provide. A missing or malformed
    /// payload is an agent fault.
    pub fn absorb(&mut self, role: AgentRole, outcome: &AgentOutcome) -> Result<(), AgentError> {
        match role {
            AgentRole::DataFetcher => {
                self.quote = Some(required(role, outcome, keys::QUOTE)?);
            }
            AgentRole::ValuationCritic | AgentRole::SimpleValuation => {
                self.valuation = Some(required(role, outcome, keys::VALUATION)?);
            }
            AgentRole::RiskManager => {
                let risk: RiskAssessment = required(role, outcome, keys::RISK)?;
                self.risk_flags.extend(risk.flags);
            }
            AgentRole::ExecutionBot => {
                self.fill = Some(required(role, outcome, keys::FILL)?);
            }
            AgentRole::Fractionalizer => {
                let adjustment: SizeAdjustment = required(role, outcome, keys::ADJUSTMENT)?;
                self.trade_size = adjustment.adjusted;
            }
            AgentRole::NewsAnalysis => {
                let news: NewsAssessment = required(role, outcome, keys::NEWS)?;
                self.verdict = Some(news.verdict);
            }
            AgentRole::Liquidation | AgentRole::Fallback => {}
        }
        Ok(())
    }

    /// Consume the context into its terminal report.
    pub fn into_report(
        self,
        final_status: FinalStatus,
        outcome: Outcome,
        failure: Option<FailureDetail>,
    ) -> WorkflowReport {
        WorkflowReport {
            ticker: self.ticker,
            final_status,
            outcome,
            path_taken: self.path,
            degraded_mode: self.degraded_mode,
            trade_size_initial: self.trade_size_initial,
            trade_size_final: self.trade_size,
            correction_counts: self.correction_counts,
            duration_total_ms: self.elapsed.as_millis() as u64,
            fill: self.fill,
            failure,
        }
    }
}

fn required<T: DeserializeOwned>(
    agent: AgentRole,
    outcome: &AgentOutcome,
    key: &'static str,
) -> Result<T, AgentError> {
    outcome
        .field(key)?
        .ok_or(AgentError::MissingPayload { agent, key })
}
