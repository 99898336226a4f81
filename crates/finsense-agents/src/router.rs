//! Data-driven correction routes.
//!
//! A route is looked up by the (stage, status) pair that failed. New recovery
//! paths are new table rows, not new branches in the orchestrator.

use std::collections::HashMap;

use finsense_models::{
    AgentRole, CorrectionKind, CorrectionLimits, NewsVerdict, Stage, StatusCode,
};

use crate::error::OrchestratorError;

/// A single action inside a correction route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStep {
    /// Call an agent; anything but `SUCCESS` aborts the run.
    Invoke(AgentRole),
    /// Switch the run to degraded mode (substitute agents from here on).
    EnterDegradedMode,
    /// Call the liquidation agent and end the run as a liquidation.
    Liquidate,
}

/// Condition on the news verdict recorded earlier in the same route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepGuard {
    Always,
    OnVerdict(NewsVerdict),
    UnlessVerdict(NewsVerdict),
}

impl StepGuard {
    pub fn admits(self, verdict: Option<NewsVerdict>) -> bool {
        match self {
            StepGuard::Always => true,
            StepGuard::OnVerdict(expected) => verdict == Some(expected),
            StepGuard::UnlessVerdict(excluded) => verdict != Some(excluded),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardedStep {
    pub step: RouteStep,
    pub guard: StepGuard,
}

impl GuardedStep {
    pub fn always(step: RouteStep) -> Self {
        Self {
            step,
            guard: StepGuard::Always,
        }
    }

    pub fn when(guard: StepGuard, step: RouteStep) -> Self {
        Self { step, guard }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionRoute {
    pub trigger: (Stage, StatusCode),
    pub kind: CorrectionKind,
    pub steps: Vec<GuardedStep>,
    /// Stage resubmitted after the steps succeed (unless a step liquidated).
    pub reentry: Stage,
    pub max_attempts: u32,
}

impl CorrectionRoute {
    /// Roles the route may call.
    pub fn roles(&self) -> impl Iterator<Item = AgentRole> + '_ {
        self.steps.iter().filter_map(|guarded| match guarded.step {
            RouteStep::Invoke(role) => Some(role),
            RouteStep::Liquidate => Some(AgentRole::Liquidation),
            RouteStep::EnterDegradedMode => None,
        })
    }
}

/// Read-only (stage, status) -> route lookup.
#[derive(Debug, Clone, Default)]
pub struct CorrectionRouter {
    routes: HashMap<(Stage, StatusCode), CorrectionRoute>,
}

impl CorrectionRouter {
    /// Build from explicit routes, rejecting malformed or duplicate rows.
    pub fn from_routes(routes: Vec<CorrectionRoute>) -> Result<Self, OrchestratorError> {
        let mut table = HashMap::new();
        for route in routes {
            let (stage, status) = route.trigger;
            let invalid = |reason: &str| OrchestratorError::InvalidRoute {
                stage,
                status,
                reason: reason.to_string(),
            };

            if status.is_success() {
                return Err(invalid("SUCCESS cannot trigger a correction"));
            }
            if status == StatusCode::Fatal {
                return Err(invalid("FATAL is never corrected"));
            }
            if route.max_attempts == 0 {
                return Err(invalid("max_attempts must be at least 1"));
            }
            if route.steps.is_empty() {
                return Err(invalid("route has no steps"));
            }
            if table.contains_key(&route.trigger) {
                return Err(invalid("duplicate trigger"));
            }
            table.insert(route.trigger, route);
        }
        Ok(Self { routes: table })
    }

    /// The fixed correction table, with attempt limits from configuration.
    pub fn standard(limits: &CorrectionLimits) -> Result<Self, OrchestratorError> {
        Self::from_routes(vec![
            CorrectionRoute {
                trigger: (Stage::RiskCheck, StatusCode::PolicyReject),
                kind: CorrectionKind::Strategic,
                steps: vec![GuardedStep::always(RouteStep::Invoke(
                    AgentRole::Fractionalizer,
                ))],
                reentry: Stage::RiskCheck,
                max_attempts: limits.for_kind(CorrectionKind::Strategic),
            },
            CorrectionRoute {
                trigger: (Stage::Fetch, StatusCode::MarketFreeze),
                kind: CorrectionKind::Market,
                steps: vec![
                    GuardedStep::always(RouteStep::Invoke(AgentRole::NewsAnalysis)),
                    GuardedStep::when(
                        StepGuard::OnVerdict(NewsVerdict::Crisis),
                        RouteStep::Liquidate,
                    ),
                    GuardedStep::when(
                        StepGuard::UnlessVerdict(NewsVerdict::Crisis),
                        RouteStep::Invoke(AgentRole::Fallback),
                    ),
                ],
                reentry: Stage::Fetch,
                max_attempts: limits.for_kind(CorrectionKind::Market),
            },
            CorrectionRoute {
                trigger: (Stage::Valuate, StatusCode::ProcessSlow),
                kind: CorrectionKind::Process,
                steps: vec![GuardedStep::always(RouteStep::EnterDegradedMode)],
                reentry: Stage::Valuate,
                max_attempts: limits.for_kind(CorrectionKind::Process),
            },
        ])
    }

    pub fn route(&self, stage: Stage, status: StatusCode) -> Option<&CorrectionRoute> {
        self.routes.get(&(stage, status))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Every role any route may call.
    pub fn roles(&self) -> Vec<AgentRole> {
        let mut roles: Vec<AgentRole> = self.routes.values().flat_map(|r| r.roles()).collect();
        roles.sort();
        roles.dedup();
        roles
    }
}
