//! Injectable forced-outcome hooks for the stub agents.
//!
//! Deterministic demo scenarios live here, not in routing: a hook matches a
//! keyword in the request's ticker and overrides one aspect of the stub's
//! result. The orchestrator never looks at ticker text.

use std::time::Duration;

use finsense_models::{AgentRequest, NewsVerdict, StatusCode};

pub const POLICY_REJECT_DEMO: &str = "POLICY_REJECT_DEMO";
pub const MARKET_FREEZE_DEMO: &str = "MARKET_FREEZE_DEMO";
pub const SLOW_PROCESS_DEMO: &str = "SLOW_PROCESS_DEMO";

/// What a matching hook overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedEffect {
    Status(StatusCode),
    /// Report this latency instead of the stub's nominal one.
    Latency(Duration),
    Verdict(NewsVerdict),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedHook {
    keyword: String,
    effect: ForcedEffect,
    /// Fire only while no correction has been spent on the request's stage.
    first_attempt_only: bool,
}

impl ForcedHook {
    pub fn new(keyword: impl Into<String>, effect: ForcedEffect) -> Self {
        Self {
            keyword: keyword.into(),
            effect,
            first_attempt_only: false,
        }
    }

    pub fn status(keyword: impl Into<String>, status: StatusCode) -> Self {
        Self::new(keyword, ForcedEffect::Status(status))
    }

    pub fn latency(keyword: impl Into<String>, latency: Duration) -> Self {
        Self::new(keyword, ForcedEffect::Latency(latency))
    }

    pub fn verdict(keyword: impl Into<String>, verdict: NewsVerdict) -> Self {
        Self::new(keyword, ForcedEffect::Verdict(verdict))
    }

    pub fn first_attempt_only(mut self) -> Self {
        self.first_attempt_only = true;
        self
    }

    pub fn effect(&self) -> ForcedEffect {
        self.effect
    }

    pub fn applies(&self, request: &AgentRequest) -> bool {
        if self.first_attempt_only && request.attempt > 0 {
            return false;
        }
        request.ticker.contains(&self.keyword)
    }
}

/// Ordered hook list held by a stub. First match per effect kind wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hooks(Vec<ForcedHook>);

impl Hooks {
    pub fn push(&mut self, hook: ForcedHook) {
        self.0.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn matching<'a>(
        &'a self,
        request: &'a AgentRequest,
    ) -> impl Iterator<Item = ForcedEffect> + 'a {
        self.0
            .iter()
            .filter(move |hook| hook.applies(request))
            .map(ForcedHook::effect)
    }

    pub fn status(&self, request: &AgentRequest) -> Option<StatusCode> {
        self.matching(request).find_map(|effect| match effect {
            ForcedEffect::Status(status) => Some(status),
            _ => None,
        })
    }

    pub fn latency(&self, request: &AgentRequest) -> Option<Duration> {
        self.matching(request).find_map(|effect| match effect {
            ForcedEffect::Latency(latency) => Some(latency),
            _ => None,
        })
    }

    pub fn verdict(&self, request: &AgentRequest) -> Option<NewsVerdict> {
        self.matching(request).find_map(|effect| match effect {
            ForcedEffect::Verdict(verdict) => Some(verdict),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::request_for;
    use finsense_models::{AgentRole, Stage};

    #[test]
    fn keyword_matches_ticker_substring() {
        let hook = ForcedHook::status(POLICY_REJECT_DEMO, StatusCode::PolicyReject);
        let request = request_for(AgentRole::RiskManager, Stage::RiskCheck, "POLICY_REJECT_DEMO");
        assert!(hook.applies(&request));

        let other = request_for(AgentRole::RiskManager, Stage::RiskCheck, "GOOGL");
        assert!(!hook.applies(&other));
    }

    #[test]
    fn first_attempt_only_stops_after_correction() {
        let hook =
            ForcedHook::status(POLICY_REJECT_DEMO, StatusCode::PolicyReject).first_attempt_only();
        let mut request =
            request_for(AgentRole::RiskManager, Stage::RiskCheck, "POLICY_REJECT_DEMO");
        assert!(hook.applies(&request));
        request.attempt = 1;
        assert!(!hook.applies(&request));
    }

    #[test]
    fn hooks_pick_by_effect_kind() {
        let mut hooks = Hooks::default();
        hooks.push(ForcedHook::verdict(MARKET_FREEZE_DEMO, NewsVerdict::Crisis));
        hooks.push(ForcedHook::status(MARKET_FREEZE_DEMO, StatusCode::MarketFreeze));

        let request = request_for(AgentRole::DataFetcher, Stage::Fetch, "MARKET_FREEZE_DEMO");
        assert_eq!(hooks.status(&request), Some(StatusCode::MarketFreeze));
        assert_eq!(hooks.verdict(&request), Some(NewsVerdict::Crisis));
        assert_eq!(hooks.latency(&request), None);
    }
}
