//! Live observation of active runs.
//!
//! A run is registered when it is prepared and removed when it reaches a
//! terminal state. Subscribers get the backlog recorded so far followed by
//! live entries; the stream ends when the run is removed.

use std::collections::HashMap;
use std::sync::Mutex;

use finsense_models::HistoryEntry;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::error::OrchestratorError;

#[derive(Default)]
struct RunChannel {
    backlog: Vec<HistoryEntry>,
    subscribers: Vec<mpsc::UnboundedSender<HistoryEntry>>,
}

/// Active runs and their subscribers. The only state shared between runs
/// besides the read-only tables; it never touches a run's context.
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<Uuid, RunChannel>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run_id: Uuid) -> Result<(), OrchestratorError> {
        let mut runs = self.lock()?;
        runs.entry(run_id).or_default();
        Ok(())
    }

    pub fn active_runs(&self) -> usize {
        self.lock().map(|runs| runs.len()).unwrap_or(0)
    }

    pub fn subscribe(&self, run_id: Uuid) -> Result<HistoryStream, OrchestratorError> {
        let mut runs = self.lock()?;
        let channel = runs
            .get_mut(&run_id)
            .ok_or(OrchestratorError::RunNotActive(run_id))?;

        let (tx, rx) = mpsc::unbounded_channel();
        for entry in &channel.backlog {
            // Receiver is alive: it is still in this scope.
            let _ = tx.send(entry.clone());
        }
        channel.subscribers.push(tx);
        Ok(HistoryStream { run_id, rx })
    }

    /// Fan an appended entry out to the run's subscribers.
    pub fn publish(&self, run_id: Uuid, entry: &HistoryEntry) {
        let mut runs = match self.lock() {
            Ok(runs) => runs,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Dropping history entry");
                return;
            }
        };
        if let Some(channel) = runs.get_mut(&run_id) {
            channel.backlog.push(entry.clone());
            channel
                .subscribers
                .retain(|subscriber| subscriber.send(entry.clone()).is_ok());
        }
    }

    /// Remove a terminal or abandoned run, closing every subscriber's stream.
    /// Retiring an unknown run is a no-op.
    pub fn finish(&self, run_id: Uuid) {
        match self.lock() {
            Ok(mut runs) => {
                runs.remove(&run_id);
            }
            Err(e) => warn!(run_id = %run_id, error = %e, "Could not retire run"),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, RunChannel>>, OrchestratorError> {
        self.runs
            .lock()
            .map_err(|e| OrchestratorError::Registry(format!("run registry mutex poisoned: {e}")))
    }
}

/// Finite, in-order stream of one run's history entries.
pub struct HistoryStream {
    run_id: Uuid,
    rx: mpsc::UnboundedReceiver<HistoryEntry>,
}

impl HistoryStream {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Next entry, or `None` once the run has reached a terminal state.
    pub async fn next(&mut self) -> Option<HistoryEntry> {
        self.rx.recv().await
    }

    /// Drain the stream until the run finishes.
    pub async fn collect(mut self) -> Vec<HistoryEntry> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await {
            entries.push(entry);
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use finsense_models::{AgentRole, Stage, StatusCode, WorkflowState};

    fn entry(sequence: u32) -> HistoryEntry {
        HistoryEntry {
            sequence,
            stage: Stage::Fetch,
            state: WorkflowState::Fetching,
            agent: Some(AgentRole::DataFetcher),
            status: StatusCode::Success,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn late_subscriber_gets_backlog_then_live() {
        let registry = RunRegistry::new();
        let run_id = Uuid::new_v4();
        registry.register(run_id).unwrap();

        registry.publish(run_id, &entry(0));
        let stream = registry.subscribe(run_id).unwrap();
        registry.publish(run_id, &entry(1));
        registry.finish(run_id);

        let entries = stream.collect().await;
        let sequences: Vec<u32> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
    }

    #[tokio::test]
    async fn finished_run_cannot_be_subscribed() {
        let registry = RunRegistry::new();
        let run_id = Uuid::new_v4();
        registry.register(run_id).unwrap();
        registry.finish(run_id);

        assert_eq!(registry.active_runs(), 0);
        assert!(matches!(
            registry.subscribe(run_id),
            Err(OrchestratorError::RunNotActive(id)) if id == run_id
        ));
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let registry = RunRegistry::new();
        let run_id = Uuid::new_v4();
        registry.register(run_id).unwrap();

        let stream = registry.subscribe(run_id).unwrap();
        drop(stream);
        registry.publish(run_id, &entry(0));

        let mut live = registry.subscribe(run_id).unwrap();
        assert_eq!(live.next().await.map(|e| e.sequence), Some(0));
        assert_eq!(registry.active_runs(), 1);
        registry.finish(run_id);
        assert!(live.next().await.is_none());
    }
}
