//! Test support: scripted agents and request builders.
//!
//! `ScriptedAgent` replays a fixed sequence of statuses regardless of the
//! request, which lets tests reach paths the deterministic stubs never take.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use finsense_models::{
    AgentOutcome, AgentRequest, AgentRole, AgentsConfig, Payload, PipelineConfig, Stage,
    StatusCode,
};
use uuid::Uuid;

use crate::agent::Agent;
use crate::error::AgentError;
use crate::orchestrator::Orchestrator;
use crate::stubs::build_stub_agents;

/// An agent that answers from a script. The last status repeats forever.
pub struct ScriptedAgent {
    role: AgentRole,
    script: Vec<StatusCode>,
    payload: Payload,
    latency: Duration,
    fails: bool,
    calls: AtomicUsize,
    seen: Mutex<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn always(role: AgentRole, status: StatusCode) -> Self {
        Self::sequence(role, vec![status])
    }

    pub fn sequence(role: AgentRole, script: Vec<StatusCode>) -> Self {
        Self {
            role,
            script,
            payload: Payload::new(),
            latency: Duration::from_millis(10),
            fails: false,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// An agent whose every call is an `AgentError`.
    pub fn erroring(role: AgentRole) -> Self {
        Self {
            fails: true,
            ..Self::always(role, StatusCode::Fatal)
        }
    }

    pub fn with_payload(mut self, key: &str, value: serde_json::Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn role(&self) -> AgentRole {
        self.role
    }

    async fn execute(&self, request: &AgentRequest) -> Result<AgentOutcome, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.clone());
        }

        if self.fails {
            return Err(AgentError::Unavailable {
                agent: self.role,
                reason: "scripted failure".to_string(),
            });
        }

        let status = self
            .script
            .get(call)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(StatusCode::Fatal);
        let mut outcome = AgentOutcome::new(status, self.latency);
        outcome.payload = self.payload.clone();
        Ok(outcome)
    }
}

/// A request as the orchestrator would build it before any correction.
pub fn request_for(role: AgentRole, stage: Stage, ticker: &str) -> AgentRequest {
    let pipeline = PipelineConfig::default();
    AgentRequest {
        run_id: Uuid::nil(),
        role,
        stage,
        ticker: ticker.to_string(),
        trade_size: pipeline.initial_trade_size,
        notional_limit: pipeline.notional_limit,
        quote: None,
        valuation: None,
        verdict: None,
        risk_flags: Default::default(),
        degraded_mode: false,
        attempt: 0,
    }
}

/// Orchestrator over the default stub agents with demo scenarios enabled.
pub fn demo_orchestrator() -> Orchestrator {
    let agents = build_stub_agents(&AgentsConfig::default());
    match Orchestrator::standard(agents, PipelineConfig::default()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => panic!("default configuration must build: {e}"),
    }
}

