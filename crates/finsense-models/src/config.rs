use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::status::{CorrectionKind, Stage};

/// Top-level configuration for FinSense.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FinsenseConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
}

/// Configuration for the orchestrated pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Trade size (shares) every run starts from.
    pub initial_trade_size: Decimal,
    /// Daily allocation limit on trade notional enforced by the risk manager.
    pub notional_limit: Decimal,
    pub budgets: StageBudgets,
    pub max_attempts: CorrectionLimits,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            initial_trade_size: Decimal::from(500),
            notional_limit: Decimal::from(150_000),
            budgets: StageBudgets::default(),
            max_attempts: CorrectionLimits::default(),
        }
    }
}

impl PipelineConfig {
    /// Returns a description of the first invalid setting, if any.
    pub fn invalid_reason(&self) -> Option<String> {
        if self.initial_trade_size <= Decimal::ZERO {
            return Some(format!(
                "initial_trade_size must be positive, got {}",
                self.initial_trade_size
            ));
        }
        if self.notional_limit <= Decimal::ZERO {
            return Some(format!(
                "notional_limit must be positive, got {}",
                self.notional_limit
            ));
        }
        for stage in Stage::PIPELINE {
            if self.budgets.for_stage(stage).is_zero() {
                return Some(format!("latency budget for {stage} must be non-zero"));
            }
        }
        for kind in [
            CorrectionKind::Strategic,
            CorrectionKind::Market,
            CorrectionKind::Process,
        ] {
            if self.max_attempts.for_kind(kind) == 0 {
                return Some(format!("max_attempts for {kind} must be at least 1"));
            }
        }
        None
    }
}

/// Per-stage latency budgets in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StageBudgets {
    pub fetch_ms: u64,
    pub valuate_ms: u64,
    pub risk_check_ms: u64,
    pub execute_ms: u64,
}

impl Default for StageBudgets {
    fn default() -> Self {
        Self {
            fetch_ms: 2_000,
            valuate_ms: 5_000,
            risk_check_ms: 2_000,
            execute_ms: 2_000,
        }
    }
}

impl StageBudgets {
    pub fn for_stage(&self, stage: Stage) -> Duration {
        let ms = match stage {
            Stage::Fetch => self.fetch_ms,
            Stage::Valuate => self.valuate_ms,
            Stage::RiskCheck => self.risk_check_ms,
            Stage::Execute => self.execute_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Bounded attempts per correction route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorrectionLimits {
    pub strategic: u32,
    pub market: u32,
    pub process: u32,
}

impl Default for CorrectionLimits {
    fn default() -> Self {
        Self {
            strategic: 1,
            market: 1,
            process: 1,
        }
    }
}

impl CorrectionLimits {
    pub fn for_kind(&self, kind: CorrectionKind) -> u32 {
        match kind {
            CorrectionKind::Strategic => self.strategic,
            CorrectionKind::Market => self.market,
            CorrectionKind::Process => self.process,
        }
    }
}

/// Configuration for the built-in agent set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    /// Make stub agents actually sleep for their simulated latency.
    pub simulate_latency: bool,
    /// Fraction of the current size the fractionalizer keeps.
    pub fractionalize_ratio: Decimal,
    /// Register the demo ticker hooks (POLICY_REJECT_DEMO and friends).
    pub demo_scenarios: bool,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            simulate_latency: false,
            fractionalize_ratio: Decimal::new(25, 2),
            demo_scenarios: true,
        }
    }
}

impl AgentsConfig {
    pub fn invalid_reason(&self) -> Option<String> {
        if self.fractionalize_ratio <= Decimal::ZERO || self.fractionalize_ratio >= Decimal::ONE {
            return Some(format!(
                "fractionalize_ratio must be in (0, 1), got {}",
                self.fractionalize_ratio
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn roundtrip_finsense_config() {
        let config = FinsenseConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: FinsenseConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn defaults_reproduce_single_attempt_table() {
        let config = FinsenseConfig::default();
        assert_eq!(config.pipeline.max_attempts, CorrectionLimits::default());
        assert_eq!(config.pipeline.max_attempts.for_kind(CorrectionKind::Market), 1);
        assert_eq!(
            config.pipeline.budgets.for_stage(Stage::Valuate),
            Duration::from_millis(5_000)
        );
        assert_eq!(config.agents.fractionalize_ratio, dec!(0.25));
        assert!(config.pipeline.invalid_reason().is_none());
        assert!(config.agents.invalid_reason().is_none());
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[pipeline]
initial_trade_size = "1000"
notional_limit = "150000"

[pipeline.budgets]
valuate_ms = 3000

[pipeline.max_attempts]
strategic = 2

[agents]
simulate_latency = true
"#;

        let config: FinsenseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pipeline.initial_trade_size, dec!(1000));
        assert_eq!(config.pipeline.budgets.valuate_ms, 3000);
        assert_eq!(config.pipeline.budgets.fetch_ms, 2000);
        assert_eq!(config.pipeline.max_attempts.strategic, 2);
        assert_eq!(config.pipeline.max_attempts.market, 1);
        assert!(config.agents.simulate_latency);
        assert!(config.agents.demo_scenarios);
    }

    #[test]
    fn empty_toml_is_default() {
        let config: FinsenseConfig = toml::from_str("").unwrap();
        assert_eq!(config, FinsenseConfig::default());
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut pipeline = PipelineConfig::default();
        pipeline.max_attempts.process = 0;
        let reason = pipeline.invalid_reason().unwrap();
        assert!(reason.contains("PROCESS"));
    }

    #[test]
    fn ratio_out_of_range_rejected() {
        let agents = AgentsConfig {
            fractionalize_ratio: dec!(1.5),
            ..AgentsConfig::default()
        };
        assert!(agents.invalid_reason().is_some());
    }
}
