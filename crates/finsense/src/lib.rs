//! FinSense - self-healing orchestrator for a trade-decision pipeline
//!
//! Runs a ticker through FETCH, VALUATE, RISK_CHECK and EXECUTE, rerouting
//! policy rejects, market freezes and slow valuations through bounded
//! correction routes instead of aborting.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use finsense::models::FinsenseConfig;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let orchestrator = finsense::build_orchestrator(&FinsenseConfig::default())?;
//! let report = finsense::run(&orchestrator, "GOOGL").await?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! # Ok(())
//! # }
//! ```

pub use finsense_agents as agents;
pub use finsense_models as models;

use finsense_agents::{build_stub_agents, Orchestrator, OrchestratorError};
use finsense_models::config::FinsenseConfig;
use finsense_models::report::WorkflowReport;

/// Build an Orchestrator over the stub agent set from configuration.
pub fn build_orchestrator(config: &FinsenseConfig) -> Result<Orchestrator, anyhow::Error> {
    if let Some(reason) = config.agents.invalid_reason() {
        return Err(OrchestratorError::Config(reason).into());
    }
    let agents = build_stub_agents(&config.agents);
    Ok(Orchestrator::standard(agents, config.pipeline.clone())?)
}

/// Run one ticker to its terminal report.
pub async fn run(
    orchestrator: &Orchestrator,
    ticker: &str,
) -> Result<WorkflowReport, OrchestratorError> {
    orchestrator.run(ticker).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use finsense_models::{FinalStatus, Outcome};
    use rust_decimal_macros::dec;

    #[test]
    fn bundled_config_parses() {
        let config: FinsenseConfig =
            toml::from_str(include_str!("../../../config/finsense.toml")).unwrap();
        assert_eq!(config, FinsenseConfig::default());
        assert!(build_orchestrator(&config).is_ok());
    }

    #[test]
    fn invalid_ratio_is_rejected() {
        let mut config = FinsenseConfig::default();
        config.agents.fractionalize_ratio = dec!(1.5);
        let err = build_orchestrator(&config).err().unwrap();
        assert!(err.to_string().contains("fractionalize_ratio"));
    }

    #[tokio::test]
    async fn facade_runs_demo_ticker() {
        let orchestrator = build_orchestrator(&FinsenseConfig::default()).unwrap();
        let report = run(&orchestrator, "policy_reject_demo").await.unwrap();
        assert_eq!(report.ticker, "POLICY_REJECT_DEMO");
        assert_eq!(report.final_status, FinalStatus::Success);
        assert_eq!(report.outcome, Outcome::Corrected);
        assert_eq!(report.trade_size_final, dec!(125));
    }

    #[tokio::test]
    async fn custom_ratio_changes_resize() {
        let mut config = FinsenseConfig::default();
        config.agents.fractionalize_ratio = dec!(0.5);
        let orchestrator = build_orchestrator(&config).unwrap();
        let report = run(&orchestrator, "POLICY_REJECT_DEMO").await.unwrap();
        assert_eq!(report.trade_size_final, dec!(250));
    }
}
