//! Deterministic stand-ins for every pipeline agent.
//!
//! `StubAgent` dispatches on its role to a small pure evaluation function,
//! then applies any forced-outcome hooks. No randomness: the same request
//! always produces the same outcome.

use std::time::Duration;

use async_trait::async_trait;
use finsense_models::agent_message::keys;
use finsense_models::{
    AgentOutcome, AgentRequest, AgentRole, AgentsConfig, Fill, NewsAssessment, NewsVerdict, Quote,
    Recommendation, RiskAssessment, SizeAdjustment, StatusCode, Valuation, ValuationMethod,
};
use rust_decimal::Decimal;
use tracing::debug;

use crate::agent::{Agent, AgentSet};
use crate::error::AgentError;
use crate::forced::{
    ForcedHook, Hooks, MARKET_FREEZE_DEMO, POLICY_REJECT_DEMO, SLOW_PROCESS_DEMO,
};

/// P/E above which the critic calls a stock overvalued.
const PE_CEILING: i64 = 30;

/// Latency the slow-process demo forces on the valuation critic.
pub const SLOW_VALUATION_LATENCY: Duration = Duration::from_millis(6_500);

pub struct StubAgent {
    role: AgentRole,
    hooks: Hooks,
    simulate_latency: bool,
    fractionalize_ratio: Decimal,
}

impl StubAgent {
    pub fn new(role: AgentRole) -> Self {
        Self {
            role,
            hooks: Hooks::default(),
            simulate_latency: false,
            fractionalize_ratio: AgentsConfig::default().fractionalize_ratio,
        }
    }

    pub fn with_hook(mut self, hook: ForcedHook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Sleep for the reported latency before returning.
    pub fn simulated(mut self, simulate: bool) -> Self {
        self.simulate_latency = simulate;
        self
    }

    pub fn with_fractionalize_ratio(mut self, ratio: Decimal) -> Self {
        self.fractionalize_ratio = ratio;
        self
    }

    /// Latency reported when no hook overrides it.
    pub fn nominal_latency(role: AgentRole) -> Duration {
        let ms = match role {
            AgentRole::DataFetcher => 120,
            AgentRole::ValuationCritic => 850,
            AgentRole::SimpleValuation => 40,
            AgentRole::RiskManager => 60,
            AgentRole::ExecutionBot => 14,
            AgentRole::Fractionalizer => 30,
            AgentRole::NewsAnalysis => 300,
            AgentRole::Liquidation => 20,
            AgentRole::Fallback => 50,
        };
        Duration::from_millis(ms)
    }

    fn evaluate(&self, request: &AgentRequest) -> Result<AgentOutcome, AgentError> {
        let latency = Self::nominal_latency(self.role);
        match self.role {
            AgentRole::DataFetcher => fetch_quote(request, latency),
            AgentRole::ValuationCritic => critic_valuation(request, latency),
            AgentRole::SimpleValuation => heuristic_valuation(request, latency),
            AgentRole::RiskManager => check_risk(request, latency),
            AgentRole::ExecutionBot => execute_order(request, latency),
            AgentRole::Fractionalizer => fractionalize(request, self.fractionalize_ratio, latency),
            AgentRole::NewsAnalysis => {
                let verdict = self.hooks.verdict(request).unwrap_or(NewsVerdict::Glitch);
                analyze_news(verdict, latency)
            }
            AgentRole::Liquidation => Ok(AgentOutcome::success(latency).with_message(
                "EMERGENCY_PROTOCOL: Liquidating positions. Order Type: IOC (Immediate or Cancel).",
            )),
            AgentRole::Fallback => Ok(AgentOutcome::success(latency).with_message(
                "FALLBACK_PROTOCOL: Secondary data feed activated. Watch order placed.",
            )),
        }
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn role(&self) -> AgentRole {
        self.role
    }

    async fn execute(&self, request: &AgentRequest) -> Result<AgentOutcome, AgentError> {
        let mut outcome = self.evaluate(request)?;

        if let Some(status) = self.hooks.status(request) {
            if outcome.status != status {
                outcome.status = status;
                outcome = outcome.with_message(forced_message(self.role, status));
            }
        }
        if let Some(latency) = self.hooks.latency(request) {
            outcome.latency = latency;
        }

        debug!(
            agent = %self.role,
            ticker = %request.ticker,
            status = %outcome.status,
            latency_ms = outcome.latency.as_millis() as u64,
            "Stub agent evaluated"
        );

        if self.simulate_latency {
            tokio::time::sleep(outcome.latency).await;
        }
        Ok(outcome)
    }
}

/// Build the full stub agent set from configuration.
pub fn build_stub_agents(config: &AgentsConfig) -> AgentSet {
    let roles = [
        AgentRole::DataFetcher,
        AgentRole::ValuationCritic,
        AgentRole::SimpleValuation,
        AgentRole::RiskManager,
        AgentRole::ExecutionBot,
        AgentRole::Fractionalizer,
        AgentRole::NewsAnalysis,
        AgentRole::Liquidation,
        AgentRole::Fallback,
    ];

    let mut set = AgentSet::new();
    for role in roles {
        let mut stub = StubAgent::new(role)
            .simulated(config.simulate_latency)
            .with_fractionalize_ratio(config.fractionalize_ratio);
        if config.demo_scenarios {
            for hook in demo_hooks(role) {
                stub = stub.with_hook(hook);
            }
        }
        set.insert(std::sync::Arc::new(stub));
    }
    set
}

/// Hooks wiring the demo ticker keywords to deterministic paths.
pub fn demo_hooks(role: AgentRole) -> Vec<ForcedHook> {
    match role {
        AgentRole::DataFetcher => vec![ForcedHook::status(
            MARKET_FREEZE_DEMO,
            StatusCode::MarketFreeze,
        )],
        AgentRole::NewsAnalysis => vec![ForcedHook::verdict(
            MARKET_FREEZE_DEMO,
            NewsVerdict::Crisis,
        )],
        AgentRole::RiskManager => vec![ForcedHook::status(
            POLICY_REJECT_DEMO,
            StatusCode::PolicyReject,
        )
        .first_attempt_only()],
        AgentRole::ValuationCritic => vec![ForcedHook::latency(
            SLOW_PROCESS_DEMO,
            SLOW_VALUATION_LATENCY,
        )],
        _ => Vec::new(),
    }
}

fn forced_message(role: AgentRole, status: StatusCode) -> String {
    match (role, status) {
        (AgentRole::DataFetcher, StatusCode::MarketFreeze) => {
            "MARKET_HALT: LULD (Limit Up-Limit Down) Pause Triggered. Volatility spike > 10%."
                .to_string()
        }
        (AgentRole::RiskManager, StatusCode::PolicyReject) => {
            "RISK_VIOLATION: Notional value exceeds daily allocation limit. REJECTED.".to_string()
        }
        (AgentRole::ValuationCritic, StatusCode::ProcessSlow) => {
            "LATENCY_WARNING: DCF model computation over budget. Optimization required."
                .to_string()
        }
        (role, status) => format!("{role}: forced {status}"),
    }
}

fn require_quote(request: &AgentRequest) -> Result<&Quote, AgentError> {
    request.quote.as_ref().ok_or(AgentError::MissingInput {
        agent: request.role,
        field: "quote",
    })
}

fn require_valuation(request: &AgentRequest) -> Result<&Valuation, AgentError> {
    request.valuation.as_ref().ok_or(AgentError::MissingInput {
        agent: request.role,
        field: "valuation",
    })
}

/// Well-formed tickers: non-empty, ASCII alphanumerics plus `.`, `-`, `_`.
pub fn is_well_formed_ticker(ticker: &str) -> bool {
    !ticker.is_empty()
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// Deterministic quote book. Unknown tickers get a synthetic quote.
pub fn quote_for(ticker: &str) -> Quote {
    let (price, pe_ratio, sector) = match ticker {
        "GOOGL" => (Decimal::new(17500, 2), Decimal::new(240, 1), "Tech"),
        "TSLA" => (Decimal::new(18000, 2), Decimal::new(600, 1), "Auto"),
        _ => (Decimal::new(10000, 2), Decimal::new(200, 1), "Unclassified"),
    };
    Quote {
        ticker: ticker.to_string(),
        price,
        pe_ratio,
        sector: sector.to_string(),
    }
}

fn fetch_quote(request: &AgentRequest, latency: Duration) -> Result<AgentOutcome, AgentError> {
    if !is_well_formed_ticker(&request.ticker) {
        return Ok(AgentOutcome::new(StatusCode::Fatal, latency)
            .with_message(format!("API_ERROR: Ticker symbol invalid: {:?}", request.ticker)));
    }

    let quote = quote_for(&request.ticker);
    let message = format!(
        "DATA: Ticker={} | Price=${} | P/E={} | Sector={}",
        quote.ticker, quote.price, quote.pe_ratio, quote.sector
    );
    Ok(AgentOutcome::success(latency)
        .with(keys::QUOTE, &quote)?
        .with_message(message))
}

fn critic_valuation(request: &AgentRequest, latency: Duration) -> Result<AgentOutcome, AgentError> {
    let quote = require_quote(request)?;

    let valuation = if quote.pe_ratio <= Decimal::from(PE_CEILING) {
        Valuation {
            recommendation: Recommendation::Buy,
            target_price: Some((quote.price * Decimal::new(12, 1)).round_dp(2)),
            method: ValuationMethod::Dcf,
            history_note: Some("Similar undervaluation in 2023 led to 15% gain.".to_string()),
        }
    } else {
        Valuation {
            recommendation: Recommendation::Sell,
            target_price: Some((quote.price * Decimal::new(85, 2)).round_dp(2)),
            method: ValuationMethod::Dcf,
            history_note: None,
        }
    };

    let message = match valuation.recommendation {
        Recommendation::Sell => "VALUATION_MODEL: OVERVALUED. Mean Reversion likely. REC: SELL.",
        _ => "VALUATION_MODEL: UNDERVALUED. REC: BUY.",
    };
    Ok(AgentOutcome::success(latency)
        .with(keys::VALUATION, &valuation)?
        .with_message(message))
}

fn heuristic_valuation(
    request: &AgentRequest,
    latency: Duration,
) -> Result<AgentOutcome, AgentError> {
    require_quote(request)?;
    let valuation = Valuation {
        recommendation: Recommendation::Buy,
        target_price: None,
        method: ValuationMethod::Heuristic,
        history_note: None,
    };
    Ok(AgentOutcome::success(latency)
        .with(keys::VALUATION, &valuation)?
        .with_message("HEURISTIC_CHECK: Quick Ratio > 1.0. Momentum Positive. Proceeding."))
}

fn check_risk(request: &AgentRequest, latency: Duration) -> Result<AgentOutcome, AgentError> {
    let quote = require_quote(request)?;
    let valuation = require_valuation(request)?;

    let Some(notional) = request.trade_size.checked_mul(quote.price) else {
        return Ok(AgentOutcome::new(StatusCode::Fatal, latency).with_message(format!(
            "RISK_ERROR: Notional of {} x ${} is out of range.",
            request.trade_size, quote.price
        )));
    };
    let mut flags = Vec::new();
    if request.degraded_mode {
        flags.push("degraded_valuation".to_string());
    }

    // Selling reduces exposure; always authorized.
    let approved = if valuation.recommendation == Recommendation::Sell {
        true
    } else {
        notional <= request.notional_limit
    };
    if !approved {
        flags.push("notional_over_limit".to_string());
    }

    let assessment = RiskAssessment {
        notional,
        limit: request.notional_limit,
        approved,
        flags,
    };

    let (status, message) = if approved {
        (
            StatusCode::Success,
            format!(
                "COMPLIANCE_CHECK: PASSED. Notional (${notional}) within limit (${}). APPROVED.",
                request.notional_limit
            ),
        )
    } else {
        (
            StatusCode::PolicyReject,
            format!(
                "RISK_VIOLATION: Notional (${notional}) > Daily Alloc Limit (${}). REJECTED.",
                request.notional_limit
            ),
        )
    };
    Ok(AgentOutcome::new(status, latency)
        .with(keys::RISK, &assessment)?
        .with_message(message))
}

fn execute_order(request: &AgentRequest, latency: Duration) -> Result<AgentOutcome, AgentError> {
    let quote = require_quote(request)?;
    let valuation = require_valuation(request)?;

    if request.trade_size <= Decimal::ZERO {
        return Ok(AgentOutcome::new(StatusCode::Fatal, latency)
            .with_message("ORDER_REJECTED: Non-positive quantity."));
    }

    let fill = Fill {
        side: valuation.recommendation,
        quantity: request.trade_size,
        price: quote.price,
        route: "SMART".to_string(),
    };
    let message = format!(
        "ORDER_FILL: {:?} {} @ ${} Executed. Route: SMART. Portfolio Updated.",
        fill.side, fill.quantity, fill.price
    );
    Ok(AgentOutcome::success(latency)
        .with(keys::FILL, &fill)?
        .with_message(message))
}

fn fractionalize(
    request: &AgentRequest,
    ratio: Decimal,
    latency: Duration,
) -> Result<AgentOutcome, AgentError> {
    let quote = require_quote(request)?;
    if quote.price <= Decimal::ZERO {
        return Ok(AgentOutcome::new(StatusCode::Fatal, latency)
            .with_message("ALGO_OPTIMIZATION: Cannot size against a non-positive price."));
    }

    let (Some(scaled), Some(within_limit)) = (
        request.trade_size.checked_mul(ratio),
        request.notional_limit.checked_div(quote.price),
    ) else {
        return Ok(AgentOutcome::new(StatusCode::Fatal, latency).with_message(format!(
            "ALGO_OPTIMIZATION: Size {} is out of range.",
            request.trade_size
        )));
    };
    let adjusted = scaled.floor().min(within_limit.floor());

    if adjusted <= Decimal::ZERO {
        return Ok(AgentOutcome::new(StatusCode::Fatal, latency).with_message(format!(
            "ALGO_OPTIMIZATION: No whole-share size satisfies the limit (input {}).",
            request.trade_size
        )));
    }

    let adjustment = SizeAdjustment {
        previous: request.trade_size,
        adjusted,
        ratio,
    };
    let message = format!(
        "ALGO_OPTIMIZATION: Input Size: {}. Limit Constraint: {}%. Target: {}. Status: RE-CALCULATED.",
        request.trade_size,
        (ratio * Decimal::ONE_HUNDRED).normalize(),
        adjusted
    );
    Ok(AgentOutcome::success(latency)
        .with(keys::ADJUSTMENT, &adjustment)?
        .with_message(message))
}

fn analyze_news(verdict: NewsVerdict, latency: Duration) -> Result<AgentOutcome, AgentError> {
    let headline = match verdict {
        NewsVerdict::Crisis => {
            "SENTIMENT_ANALYSIS: CONFIRMED Black Swan. Regulatory Action detected. ACTION: Fundamental Change."
        }
        NewsVerdict::Glitch => {
            "SENTIMENT_ANALYSIS: Noise detected. No fundamental shift. ACTION: Temporary Glitch."
        }
        NewsVerdict::Inconclusive => {
            "SENTIMENT_ANALYSIS: Mixed signals. No confirmed catalyst. ACTION: Monitor."
        }
    };
    let assessment = NewsAssessment {
        verdict,
        headline: headline.to_string(),
    };
    Ok(AgentOutcome::success(latency)
        .with(keys::NEWS, &assessment)?
        .with_message(headline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::request_for;
    use finsense_models::Stage;
    use rust_decimal_macros::dec;

    fn with_quote(mut request: AgentRequest, ticker: &str) -> AgentRequest {
        request.quote = Some(quote_for(ticker));
        request
    }

    fn with_buy(mut request: AgentRequest) -> AgentRequest {
        request.valuation = Some(Valuation {
            recommendation: Recommendation::Buy,
            target_price: None,
            method: ValuationMethod::Dcf,
            history_note: None,
        });
        request
    }

    #[tokio::test]
    async fn fetcher_serves_quote_book() {
        let agent = StubAgent::new(AgentRole::DataFetcher);
        let request = request_for(AgentRole::DataFetcher, Stage::Fetch, "GOOGL");
        let outcome = agent.execute(&request).await.unwrap();

        assert_eq!(outcome.status, StatusCode::Success);
        let quote: Quote = outcome.field(keys::QUOTE).unwrap().unwrap();
        assert_eq!(quote.price, dec!(175.00));
        assert_eq!(quote.sector, "Tech");
        assert_eq!(outcome.latency, Duration::from_millis(120));
    }

    #[tokio::test]
    async fn fetcher_rejects_malformed_ticker_as_fatal() {
        let agent = StubAgent::new(AgentRole::DataFetcher);
        let request = request_for(AgentRole::DataFetcher, Stage::Fetch, "BAD TICKER!");
        let outcome = agent.execute(&request).await.unwrap();
        assert_eq!(outcome.status, StatusCode::Fatal);
        assert!(outcome.message().unwrap().starts_with("API_ERROR"));
    }

    #[tokio::test]
    async fn forced_freeze_overrides_fetch() {
        let agent = StubAgent::new(AgentRole::DataFetcher)
            .with_hook(ForcedHook::status(MARKET_FREEZE_DEMO, StatusCode::MarketFreeze));
        let request = request_for(AgentRole::DataFetcher, Stage::Fetch, MARKET_FREEZE_DEMO);
        let outcome = agent.execute(&request).await.unwrap();
        assert_eq!(outcome.status, StatusCode::MarketFreeze);
        assert!(outcome.message().unwrap().starts_with("MARKET_HALT"));
    }

    #[tokio::test]
    async fn critic_sells_expensive_stock() {
        let agent = StubAgent::new(AgentRole::ValuationCritic);
        let request = with_quote(
            request_for(AgentRole::ValuationCritic, Stage::Valuate, "TSLA"),
            "TSLA",
        );
        let outcome = agent.execute(&request).await.unwrap();
        let valuation: Valuation = outcome.field(keys::VALUATION).unwrap().unwrap();
        assert_eq!(valuation.recommendation, Recommendation::Sell);
        assert_eq!(valuation.target_price, Some(dec!(153.00)));
    }

    #[tokio::test]
    async fn critic_without_quote_is_an_error() {
        let agent = StubAgent::new(AgentRole::ValuationCritic);
        let request = request_for(AgentRole::ValuationCritic, Stage::Valuate, "GOOGL");
        let err = agent.execute(&request).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingInput { field: "quote", .. }));
    }

    #[tokio::test]
    async fn slow_hook_only_changes_latency() {
        let agent = StubAgent::new(AgentRole::ValuationCritic)
            .with_hook(ForcedHook::latency(SLOW_PROCESS_DEMO, SLOW_VALUATION_LATENCY));
        let request = with_quote(
            request_for(AgentRole::ValuationCritic, Stage::Valuate, SLOW_PROCESS_DEMO),
            SLOW_PROCESS_DEMO,
        );
        let outcome = agent.execute(&request).await.unwrap();
        assert_eq!(outcome.status, StatusCode::Success);
        assert_eq!(outcome.latency, SLOW_VALUATION_LATENCY);
    }

    #[tokio::test]
    async fn risk_rejects_over_limit_notional() {
        let agent = StubAgent::new(AgentRole::RiskManager);
        let mut request = with_buy(with_quote(
            request_for(AgentRole::RiskManager, Stage::RiskCheck, "GOOGL"),
            "GOOGL",
        ));
        request.trade_size = dec!(1000);
        let outcome = agent.execute(&request).await.unwrap();

        assert_eq!(outcome.status, StatusCode::PolicyReject);
        let risk: RiskAssessment = outcome.field(keys::RISK).unwrap().unwrap();
        assert_eq!(risk.notional, dec!(175000.00));
        assert!(!risk.approved);
        assert_eq!(risk.flags, vec!["notional_over_limit".to_string()]);
    }

    #[tokio::test]
    async fn risk_always_approves_sells() {
        let agent = StubAgent::new(AgentRole::RiskManager);
        let mut request = with_quote(
            request_for(AgentRole::RiskManager, Stage::RiskCheck, "TSLA"),
            "TSLA",
        );
        request.trade_size = dec!(100000);
        request.valuation = Some(Valuation {
            recommendation: Recommendation::Sell,
            target_price: None,
            method: ValuationMethod::Dcf,
            history_note: None,
        });
        let outcome = agent.execute(&request).await.unwrap();
        assert_eq!(outcome.status, StatusCode::Success);
    }

    #[tokio::test]
    async fn fractionalizer_respects_ratio_and_limit() {
        let agent = StubAgent::new(AgentRole::Fractionalizer);
        let mut request = with_quote(
            request_for(AgentRole::Fractionalizer, Stage::RiskCheck, "GOOGL"),
            "GOOGL",
        );
        request.trade_size = dec!(4000);
        let outcome = agent.execute(&request).await.unwrap();
        let adjustment: SizeAdjustment = outcome.field(keys::ADJUSTMENT).unwrap().unwrap();
        // 25% of 4000 is 1000 shares, but 150000 / 175 caps it at 857.
        assert_eq!(adjustment.adjusted, dec!(857));
        assert_eq!(adjustment.previous, dec!(4000));
    }

    #[tokio::test]
    async fn fractionalizer_fatal_when_nothing_fits() {
        let agent = StubAgent::new(AgentRole::Fractionalizer);
        let mut request = with_quote(
            request_for(AgentRole::Fractionalizer, Stage::RiskCheck, "GOOGL"),
            "GOOGL",
        );
        request.trade_size = dec!(3);
        let outcome = agent.execute(&request).await.unwrap();
        assert_eq!(outcome.status, StatusCode::Fatal);
    }

    #[tokio::test]
    async fn risk_out_of_range_notional_is_fatal() {
        let agent = StubAgent::new(AgentRole::RiskManager);
        let mut request = with_buy(with_quote(
            request_for(AgentRole::RiskManager, Stage::RiskCheck, "GOOGL"),
            "GOOGL",
        ));
        request.trade_size = Decimal::MAX;
        let outcome = agent.execute(&request).await.unwrap();

        assert_eq!(outcome.status, StatusCode::Fatal);
        assert!(outcome.message().unwrap().contains("out of range"));
    }

    #[tokio::test]
    async fn fractionalizer_out_of_range_is_fatal() {
        let agent = StubAgent::new(AgentRole::Fractionalizer);
        let mut request = with_quote(
            request_for(AgentRole::Fractionalizer, Stage::RiskCheck, "GOOGL"),
            "GOOGL",
        );
        if let Some(quote) = request.quote.as_mut() {
            quote.price = Decimal::new(1, 28);
        }
        request.notional_limit = Decimal::MAX;
        let outcome = agent.execute(&request).await.unwrap();
        assert_eq!(outcome.status, StatusCode::Fatal);
    }

    #[tokio::test]
    async fn news_defaults_to_glitch() {
        let agent = StubAgent::new(AgentRole::NewsAnalysis);
        let request = request_for(AgentRole::NewsAnalysis, Stage::Fetch, "GOOGL");
        let outcome = agent.execute(&request).await.unwrap();
        let news: NewsAssessment = outcome.field(keys::NEWS).unwrap().unwrap();
        assert_eq!(news.verdict, NewsVerdict::Glitch);
    }

    #[tokio::test]
    async fn execution_fills_at_quote() {
        let agent = StubAgent::new(AgentRole::ExecutionBot);
        let request = with_buy(with_quote(
            request_for(AgentRole::ExecutionBot, Stage::Execute, "GOOGL"),
            "GOOGL",
        ));
        let outcome = agent.execute(&request).await.unwrap();
        let fill: Fill = outcome.field(keys::FILL).unwrap().unwrap();
        assert_eq!(fill.quantity, request.trade_size);
        assert_eq!(fill.route, "SMART");
    }

    #[test]
    fn stub_set_covers_every_role() {
        let set = build_stub_agents(&AgentsConfig::default());
        assert_eq!(set.len(), 9);
        assert!(set.get(AgentRole::Liquidation).is_some());
    }

    #[test]
    fn ticker_validation() {
        assert!(is_well_formed_ticker("BRK.B"));
        assert!(is_well_formed_ticker("POLICY_REJECT_DEMO"));
        assert!(!is_well_formed_ticker(""));
        assert!(!is_well_formed_ticker("GO OGL"));
    }
}
