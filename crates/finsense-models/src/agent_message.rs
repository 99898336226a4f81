use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{NewsVerdict, Stage, StatusCode};

/// Free-form agent output slot, folded into the run context by the orchestrator.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Payload keys understood by the orchestrator.
pub mod keys {
    pub const QUOTE: &str = "quote";
    pub const VALUATION: &str = "valuation";
    pub const RISK: &str = "risk";
    pub const ADJUSTMENT: &str = "adjustment";
    pub const NEWS: &str = "news";
    pub const FILL: &str = "fill";
    pub const MESSAGE: &str = "message";
}

/// Every agent the pipeline knows how to call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    DataFetcher,
    ValuationCritic,
    SimpleValuation,
    RiskManager,
    ExecutionBot,
    Fractionalizer,
    NewsAnalysis,
    Liquidation,
    Fallback,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::DataFetcher => "DataFetcher",
            AgentRole::ValuationCritic => "ValuationCritic",
            AgentRole::SimpleValuation => "SimpleValuation",
            AgentRole::RiskManager => "RiskManager",
            AgentRole::ExecutionBot => "ExecutionBot",
            AgentRole::Fractionalizer => "Fractionalizer",
            AgentRole::NewsAnalysis => "NewsAnalysis",
            AgentRole::Liquidation => "Liquidation",
            AgentRole::Fallback => "Fallback",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only projection of the run context handed to an agent.
///
/// Agents never see the context itself; whatever they want to change goes
/// into the returned payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    pub run_id: Uuid,
    pub role: AgentRole,
    /// Stage being served. For correction steps this is the stage that failed.
    pub stage: Stage,
    pub ticker: String,
    pub trade_size: Decimal,
    /// Maximum notional the risk policy allows for one trade.
    pub notional_limit: Decimal,
    pub quote: Option<Quote>,
    pub valuation: Option<Valuation>,
    pub verdict: Option<NewsVerdict>,
    pub risk_flags: BTreeSet<String>,
    pub degraded_mode: bool,
    /// Corrections already spent on `stage` in this run.
    pub attempt: u32,
}

/// Result of one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentOutcome {
    pub status: StatusCode,
    pub payload: Payload,
    /// Simulated (or reported) time the agent spent.
    pub latency: Duration,
}

impl AgentOutcome {
    pub fn new(status: StatusCode, latency: Duration) -> Self {
        Self {
            status,
            payload: Payload::new(),
            latency,
        }
    }

    pub fn success(latency: Duration) -> Self {
        Self::new(StatusCode::Success, latency)
    }

    /// Attach a serializable value under `key`.
    pub fn with<T: Serialize>(mut self, key: &str, value: &T) -> Result<Self, serde_json::Error> {
        self.payload
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.payload.insert(
            keys::MESSAGE.to_string(),
            serde_json::Value::String(message.into()),
        );
        self
    }

    /// Decode the value under `key`, `Ok(None)` when absent.
    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        match self.payload.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.payload.get(keys::MESSAGE).and_then(|v| v.as_str())
    }
}

/// Market snapshot returned by the data fetcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub ticker: String,
    pub price: Decimal,
    pub pe_ratio: Decimal,
    pub sector: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMethod {
    /// Full discounted cash flow model. Slow.
    Dcf,
    /// Quick ratio/momentum heuristic used in degraded mode.
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Valuation {
    pub recommendation: Recommendation,
    pub target_price: Option<Decimal>,
    pub method: ValuationMethod,
    /// Recalled precedent, if the critic found one.
    pub history_note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub notional: Decimal,
    pub limit: Decimal,
    pub approved: bool,
    pub flags: Vec<String>,
}

/// Trade size recomputed by the fractionalizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SizeAdjustment {
    pub previous: Decimal,
    pub adjusted: Decimal,
    pub ratio: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsAssessment {
    pub verdict: NewsVerdict,
    pub headline: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fill {
    pub side: Recommendation,
    pub quantity: Decimal,
    pub price: Decimal,
    pub route: String,
}
