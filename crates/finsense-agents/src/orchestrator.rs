use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use finsense_models::{
    AgentOutcome, AgentRole, FailureCause, FailureClass, FailureDetail, FinalStatus, Outcome,
    PathStep, PipelineConfig, Stage, StatusCode, WorkflowReport, WorkflowState,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agent::AgentSet;
use crate::context::RunContext;
use crate::error::OrchestratorError;
use crate::registry::{HistoryStream, RunRegistry};
use crate::router::{CorrectionRoute, CorrectionRouter, RouteStep};
use crate::stage_table::StageTable;

/// A run that has been registered (and can be subscribed to) but not started.
///
/// Dropping it without passing it to `Orchestrator::execute` retires the run,
/// which ends any open history streams.
pub struct PreparedRun {
    run_id: Uuid,
    ticker: String,
    registry: Arc<RunRegistry>,
}

impl PreparedRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }
}

impl fmt::Debug for PreparedRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRun")
            .field("run_id", &self.run_id)
            .field("ticker", &self.ticker)
            .finish()
    }
}

impl Drop for PreparedRun {
    fn drop(&mut self) {
        self.registry.finish(self.run_id);
    }
}

/// How a run left the state machine.
enum Terminal {
    Completed(Outcome),
    Failed(FailureDetail),
}

/// Where a successful correction route sends the run.
enum Resolution {
    Reenter(Stage),
    Liquidated,
}

/// The orchestrator drives each run through the stage pipeline and reroutes
/// failures through bounded correction routes.
///
/// Shared by concurrent runs: the agent set, stage table and router are
/// read-only after construction, and every run owns its own `RunContext`.
pub struct Orchestrator {
    agents: AgentSet,
    stages: StageTable,
    router: CorrectionRouter,
    config: PipelineConfig,
    registry: Arc<RunRegistry>,
}

impl Orchestrator {
    /// Build an orchestrator, checking that every role the stage table and
    /// router can dispatch to has an agent.
    pub fn new(
        agents: AgentSet,
        stages: StageTable,
        router: CorrectionRouter,
        config: PipelineConfig,
    ) -> Result<Self, OrchestratorError> {
        if let Some(reason) = config.invalid_reason() {
            return Err(OrchestratorError::Config(reason));
        }
        for role in stages.roles().into_iter().chain(router.roles()) {
            agents.require(role)?;
        }

        Ok(Self {
            agents,
            stages,
            router,
            config,
            registry: Arc::new(RunRegistry::new()),
        })
    }

    /// Standard stage table and correction table derived from `config`.
    pub fn standard(agents: AgentSet, config: PipelineConfig) -> Result<Self, OrchestratorError> {
        if let Some(reason) = config.invalid_reason() {
            return Err(OrchestratorError::Config(reason));
        }
        let stages = StageTable::new(&config.budgets);
        let router = CorrectionRouter::standard(&config.max_attempts)?;
        Self::new(agents, stages, router, config)
    }

    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    pub fn router(&self) -> &CorrectionRouter {
        &self.router
    }

    pub fn active_runs(&self) -> usize {
        self.registry.active_runs()
    }

    /// Run one analysis to its terminal report.
    pub async fn run(&self, ticker: &str) -> Result<WorkflowReport, OrchestratorError> {
        let prepared = self.prepare(ticker)?;
        Ok(self.execute(prepared).await)
    }

    /// Register a run so it can be observed before it starts.
    pub fn prepare(&self, ticker: &str) -> Result<PreparedRun, OrchestratorError> {
        let run_id = Uuid::new_v4();
        self.registry.register(run_id)?;
        let run = PreparedRun {
            run_id,
            ticker: ticker.trim().to_uppercase(),
            registry: Arc::clone(&self.registry),
        };
        Ok(run)
    }

    /// Observe an active run's history. Ends when the run is terminal.
    pub fn subscribe(&self, run_id: Uuid) -> Result<HistoryStream, OrchestratorError> {
        self.registry.subscribe(run_id)
    }

    /// Drive a prepared run to COMPLETED or FAILED.
    pub async fn execute(&self, run: PreparedRun) -> WorkflowReport {
        let start = Instant::now();
        let run_id = run.run_id;
        let ticker = run.ticker.clone();
        info!(run_id = %run_id, ticker = %ticker, "Starting workflow run");

        let mut ctx = RunContext::new(
            run_id,
            ticker,
            self.config.initial_trade_size,
            self.config.notional_limit,
        );

        let report = match self.drive(&mut ctx).await {
            Terminal::Completed(outcome) => {
                let last_stage = ctx.history().last().map(|e| e.stage).unwrap_or(Stage::Execute);
                self.record(
                    &mut ctx,
                    last_stage,
                    WorkflowState::Completed,
                    None,
                    StatusCode::Success,
                );
                info!(
                    run_id = %run_id,
                    ticker = %ctx.ticker(),
                    outcome = ?outcome,
                    degraded_mode = ctx.degraded_mode(),
                    trade_size = %ctx.trade_size(),
                    elapsed_ms = start.elapsed().as_millis(),
                    "Workflow completed"
                );
                ctx.into_report(FinalStatus::Success, outcome, None)
            }
            Terminal::Failed(detail) => {
                self.record(
                    &mut ctx,
                    detail.stage,
                    WorkflowState::Failed,
                    detail.agent,
                    detail.status,
                );
                error!(
                    run_id = %run_id,
                    ticker = %ctx.ticker(),
                    stage = %detail.stage,
                    status = %detail.status,
                    cause = ?detail.cause,
                    reason = %detail.reason,
                    "Workflow failed"
                );
                ctx.into_report(FinalStatus::Failed, Outcome::Failed, Some(detail))
            }
        };

        self.registry.finish(run_id);
        drop(run);
        report
    }

    async fn drive(&self, ctx: &mut RunContext) -> Terminal {
        let mut stage = Stage::first();
        loop {
            let role = self.stages.agent_for(stage, ctx.degraded_mode());
            ctx.visit(PathStep::Stage(stage));

            let outcome = self
                .invoke(ctx, role, stage, Some(self.stages.budget(stage)))
                .await;
            let status = outcome.status;
            self.record(ctx, stage, stage.working_state(), Some(role), status);

            if status.is_success() {
                if let Err(e) = ctx.absorb(role, &outcome) {
                    return Terminal::Failed(failure(
                        stage,
                        StatusCode::Fatal,
                        FailureCause::MalformedPayload,
                        Some(role),
                        e.to_string(),
                    ));
                }
                info!(run_id = %ctx.run_id(), stage = %stage, agent = %role, "Stage succeeded");
                match stage.next() {
                    Some(next) => {
                        stage = next;
                        continue;
                    }
                    None => {
                        let outcome = if ctx.path().iter().any(|s| matches!(s, PathStep::Correcting(_))) {
                            Outcome::Corrected
                        } else {
                            Outcome::Clean
                        };
                        return Terminal::Completed(outcome);
                    }
                }
            }

            let reason = outcome
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{role} returned {status}"));

            if status == StatusCode::Fatal {
                return Terminal::Failed(failure(
                    stage,
                    status,
                    FailureCause::AgentFatal,
                    Some(role),
                    reason,
                ));
            }

            let Some(route) = self.router.route(stage, status) else {
                return Terminal::Failed(failure(
                    stage,
                    status,
                    FailureCause::Unrouted,
                    Some(role),
                    reason,
                ));
            };

            let spent = ctx.correction_count(stage);
            if spent >= route.max_attempts {
                return Terminal::Failed(failure(
                    stage,
                    status,
                    FailureCause::AttemptsExhausted,
                    Some(role),
                    format!(
                        "{reason} (correction attempts exhausted: {spent}/{})",
                        route.max_attempts
                    ),
                ));
            }

            let attempt = ctx.bump_correction(stage);
            let state = WorkflowState::Correcting(route.kind);
            ctx.visit(PathStep::Correcting(route.kind));
            self.record(ctx, stage, state, None, status);
            warn!(
                run_id = %ctx.run_id(),
                stage = %stage,
                status = %status,
                class = ?status.failure_class(),
                kind = %route.kind,
                attempt,
                max_attempts = route.max_attempts,
                "Entering correction route"
            );

            match self.correct(ctx, route, stage).await {
                Ok(Resolution::Reenter(reentry)) => {
                    info!(run_id = %ctx.run_id(), stage = %reentry, "Re-entering stage after correction");
                    stage = reentry;
                }
                Ok(Resolution::Liquidated) => return Terminal::Completed(Outcome::Liquidated),
                Err(detail) => return Terminal::Failed(detail),
            }
        }
    }

    /// Execute a route's admitted steps in order. Any step that does not
    /// succeed fails the run; corrections are never corrected.
    async fn correct(
        &self,
        ctx: &mut RunContext,
        route: &CorrectionRoute,
        stage: Stage,
    ) -> Result<Resolution, FailureDetail> {
        let state = WorkflowState::Correcting(route.kind);
        ctx.clear_verdict();

        for guarded in &route.steps {
            if !guarded.guard.admits(ctx.verdict()) {
                continue;
            }
            match guarded.step {
                RouteStep::Invoke(role) => {
                    self.run_step(ctx, stage, state, role).await?;
                }
                RouteStep::EnterDegradedMode => {
                    ctx.enter_degraded_mode();
                    warn!(
                        run_id = %ctx.run_id(),
                        stage = %stage,
                        substitute = %self.stages.agent_for(stage, true),
                        "Degraded mode enabled for the rest of the run"
                    );
                }
                RouteStep::Liquidate => {
                    ctx.visit(PathStep::Liquidation);
                    self.run_step(ctx, stage, state, AgentRole::Liquidation)
                        .await?;
                    warn!(run_id = %ctx.run_id(), ticker = %ctx.ticker(), "Positions liquidated; planned trade abandoned");
                    return Ok(Resolution::Liquidated);
                }
            }
        }
        Ok(Resolution::Reenter(route.reentry))
    }

    async fn run_step(
        &self,
        ctx: &mut RunContext,
        stage: Stage,
        state: WorkflowState,
        role: AgentRole,
    ) -> Result<(), FailureDetail> {
        let outcome = self.invoke(ctx, role, stage, None).await;
        self.record(ctx, stage, state, Some(role), outcome.status);

        if !outcome.status.is_success() {
            let reason = outcome
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{role} returned {}", outcome.status));
            return Err(failure(
                stage,
                outcome.status,
                FailureCause::CorrectionStepFailed,
                Some(role),
                reason,
            ));
        }

        ctx.absorb(role, &outcome).map_err(|e| {
            failure(
                stage,
                StatusCode::Fatal,
                FailureCause::MalformedPayload,
                Some(role),
                e.to_string(),
            )
        })?;
        debug!(run_id = %ctx.run_id(), agent = %role, "Correction step succeeded");
        Ok(())
    }

    /// Call one agent and account for its latency.
    ///
    /// Agent errors become `FATAL`. With a budget, a `SUCCESS` whose observed
    /// latency exceeds it becomes `PROCESS_SLOW`.
    async fn invoke(
        &self,
        ctx: &mut RunContext,
        role: AgentRole,
        stage: Stage,
        budget: Option<Duration>,
    ) -> AgentOutcome {
        let Some(agent) = self.agents.get(role) else {
            return AgentOutcome::new(StatusCode::Fatal, Duration::ZERO)
                .with_message(format!("No agent registered for role {role}"));
        };

        let request = ctx.request(role, stage);
        debug!(run_id = %ctx.run_id(), agent = %agent.name(), stage = %stage, "Invoking agent");

        let started = Instant::now();
        let result = agent.execute(&request).await;
        let measured = started.elapsed();

        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(run_id = %ctx.run_id(), agent = %role, error = %e, "Agent fault");
                AgentOutcome::new(StatusCode::Fatal, measured).with_message(e.to_string())
            }
        };
        outcome.latency = outcome.latency.max(measured);
        ctx.add_latency(outcome.latency);

        if let Some(budget) = budget {
            if outcome.status.is_success() && outcome.latency > budget {
                warn!(
                    run_id = %ctx.run_id(),
                    agent = %role,
                    stage = %stage,
                    elapsed_ms = outcome.latency.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "Latency budget exceeded"
                );
                outcome.status = StatusCode::ProcessSlow;
            }
        }
        outcome
    }

    fn record(
        &self,
        ctx: &mut RunContext,
        stage: Stage,
        state: WorkflowState,
        agent: Option<AgentRole>,
        status: StatusCode,
    ) {
        let run_id = ctx.run_id();
        let entry = ctx.record(stage, state, agent, status);
        self.registry.publish(run_id, entry);
    }
}

fn failure(
    stage: Stage,
    status: StatusCode,
    cause: FailureCause,
    agent: Option<AgentRole>,
    reason: String,
) -> FailureDetail {
    FailureDetail {
        stage,
        status,
        class: FailureClass::FatalFailure,
        cause,
        agent,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{demo_orchestrator, ScriptedAgent};
    use crate::stubs::build_stub_agents;
    use finsense_models::AgentsConfig;
    use std::sync::Arc;

    #[test]
    fn construction_requires_every_dispatchable_role() {
        let stubs = build_stub_agents(&AgentsConfig::default());
        let agents = AgentSet::new().with(
            stubs
                .get(AgentRole::DataFetcher)
                .cloned()
                .expect("stub set has a data fetcher"),
        );
        let err = Orchestrator::standard(agents, PipelineConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, OrchestratorError::MissingAgent(_)));
    }

    #[test]
    fn construction_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.max_attempts.market = 0;
        let agents = build_stub_agents(&AgentsConfig::default());
        let err = Orchestrator::standard(agents, config).err().unwrap();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[tokio::test]
    async fn clean_run_walks_four_stages() {
        let orchestrator = demo_orchestrator();
        let report = orchestrator.run("GOOGL").await.unwrap();

        assert_eq!(report.final_status, FinalStatus::Success);
        assert_eq!(report.outcome, Outcome::Clean);
        assert_eq!(
            report.path_taken,
            Stage::PIPELINE.map(PathStep::Stage).to_vec()
        );
        assert!(!report.degraded_mode);
        assert_eq!(report.duration_total_ms, 120 + 850 + 60 + 14);
        assert_eq!(orchestrator.active_runs(), 0);
    }

    #[tokio::test]
    async fn ticker_is_normalised() {
        let orchestrator = demo_orchestrator();
        let report = orchestrator.run("  googl ").await.unwrap();
        assert_eq!(report.ticker, "GOOGL");
    }

    #[tokio::test]
    async fn agent_error_becomes_fatal() {
        let mut agents = build_stub_agents(&AgentsConfig::default());
        agents.insert(Arc::new(ScriptedAgent::erroring(AgentRole::ExecutionBot)));
        let orchestrator = Orchestrator::standard(agents, PipelineConfig::default()).unwrap();

        let report = orchestrator.run("GOOGL").await.unwrap();
        let failure = report.failure.unwrap();
        assert_eq!(failure.stage, Stage::Execute);
        assert_eq!(failure.status, StatusCode::Fatal);
        assert_eq!(failure.cause, FailureCause::AgentFatal);
        assert_eq!(failure.agent, Some(AgentRole::ExecutionBot));
    }

    #[tokio::test]
    async fn missing_payload_fails_run() {
        let mut agents = build_stub_agents(&AgentsConfig::default());
        agents.insert(Arc::new(ScriptedAgent::always(
            AgentRole::DataFetcher,
            StatusCode::Success,
        )));
        let orchestrator = Orchestrator::standard(agents, PipelineConfig::default()).unwrap();

        let report = orchestrator.run("GOOGL").await.unwrap();
        let failure = report.failure.unwrap();
        assert_eq!(failure.cause, FailureCause::MalformedPayload);
        assert_eq!(failure.stage, Stage::Fetch);
    }
}
