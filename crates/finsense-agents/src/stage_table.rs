use std::collections::HashMap;
use std::time::Duration;

use finsense_models::{AgentRole, Stage, StageBudgets, StatusCode};

/// One row of the pipeline stage table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub stage: Stage,
    pub primary: AgentRole,
    /// Lower-fidelity agent used once the run is in degraded mode.
    pub substitute: Option<AgentRole>,
    pub budget: Duration,
    /// Non-success statuses the primary agent is documented to emit.
    pub emits: Vec<StatusCode>,
}

/// Static stage -> agent mapping. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct StageTable {
    specs: HashMap<Stage, StageSpec>,
}

impl StageTable {
    pub fn new(budgets: &StageBudgets) -> Self {
        let rows = [
            StageSpec {
                stage: Stage::Fetch,
                primary: AgentRole::DataFetcher,
                substitute: None,
                budget: budgets.for_stage(Stage::Fetch),
                // FATAL for malformed tickers.
                emits: vec![StatusCode::MarketFreeze, StatusCode::Fatal],
            },
            StageSpec {
                stage: Stage::Valuate,
                primary: AgentRole::ValuationCritic,
                substitute: Some(AgentRole::SimpleValuation),
                budget: budgets.for_stage(Stage::Valuate),
                emits: vec![StatusCode::ProcessSlow],
            },
            StageSpec {
                stage: Stage::RiskCheck,
                primary: AgentRole::RiskManager,
                substitute: None,
                budget: budgets.for_stage(Stage::RiskCheck),
                emits: vec![StatusCode::PolicyReject],
            },
            StageSpec {
                stage: Stage::Execute,
                primary: AgentRole::ExecutionBot,
                substitute: None,
                budget: budgets.for_stage(Stage::Execute),
                emits: vec![StatusCode::Fatal],
            },
        ];

        Self {
            specs: rows.into_iter().map(|spec| (spec.stage, spec)).collect(),
        }
    }

    pub fn spec(&self, stage: Stage) -> &StageSpec {
        // Every Stage variant is inserted in `new`.
        &self.specs[&stage]
    }

    /// Agent to run for `stage`, honouring degraded-mode substitution.
    pub fn agent_for(&self, stage: Stage, degraded_mode: bool) -> AgentRole {
        let spec = self.spec(stage);
        match (degraded_mode, spec.substitute) {
            (true, Some(substitute)) => substitute,
            _ => spec.primary,
        }
    }

    pub fn budget(&self, stage: Stage) -> Duration {
        self.spec(stage).budget
    }

    /// Every role the table may dispatch to.
    pub fn roles(&self) -> Vec<AgentRole> {
        let mut roles: Vec<AgentRole> = self
            .specs
            .values()
            .flat_map(|spec| std::iter::once(spec.primary).chain(spec.substitute))
            .collect();
        roles.sort();
        roles
    }
}

impl Default for StageTable {
    fn default() -> Self {
        Self::new(&StageBudgets::default())
    }
}
