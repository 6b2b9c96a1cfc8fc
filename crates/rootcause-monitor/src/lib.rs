//! Observability for diagnosis runs: per-worker metrics and a SQLite run store.

mod collector;
mod record;
mod store;

pub use collector::StoreCollector;
pub use record::{RunQuery, RunSummary, WorkerSpan};
pub use store::{MetricsSummary, RunStore, StoreError};

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Metrics collected from a single worker execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub task_id: String,
    pub target: String,
    pub round: u32,
    /// Terminal report status (`conclusive`, `inconclusive`, `budget-exhausted`).
    pub status: String,
    /// True when the task ended `failed` rather than `done`.
    pub failed: bool,
    pub calls_made: u32,
    pub calls_remaining: u32,
    /// Unix timestamp (milliseconds) when the worker started.
    pub start_time: i64,
    /// Unix timestamp (milliseconds) when the worker returned.
    pub end_time: i64,
}

impl WorkerMetrics {
    pub fn elapsed_ms(&self) -> u64 {
        (self.end_time - self.start_time).max(0) as u64
    }
}

/// Summary of one dispatch round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundMetrics {
    pub round: u32,
    pub tasks_dispatched: usize,
    pub conclusive: usize,
    pub elapsed_ms: u64,
}

/// Aggregated metrics for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: String,
    pub total_tool_calls: u32,
    pub failed_workers: u32,
    pub rounds: Vec<RoundMetrics>,
    pub workers: Vec<WorkerMetrics>,
}

/// Sink for run metrics. Implementations must tolerate concurrent callers.
pub trait RunCollector: Send + Sync {
    fn run_id(&self) -> &str;
    /// Record metrics from a finished worker.
    fn record_worker(&self, metrics: WorkerMetrics);
    /// Record the end of a dispatch round.
    fn record_round(&self, metrics: RoundMetrics);
    /// Return aggregated run metrics.
    fn flush(&self) -> RunMetrics;
    /// Reset the collector for a new run.
    fn reset(&self);
}

#[derive(Debug, Default)]
struct Collected {
    workers: Vec<WorkerMetrics>,
    rounds: Vec<RoundMetrics>,
}

impl Collected {
    fn aggregate(&self, run_id: &str) -> RunMetrics {
        RunMetrics {
            run_id: run_id.to_string(),
            total_tool_calls: self.workers.iter().map(|w| w.calls_made).sum(),
            failed_workers: self.workers.iter().filter(|w| w.failed).count() as u32,
            rounds: self.rounds.clone(),
            workers: self.workers.clone(),
        }
    }
}

/// In-memory run collector (default implementation).
pub struct InMemoryCollector {
    run_id: String,
    collected: Mutex<Collected>,
}

impl InMemoryCollector {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            collected: Mutex::new(Collected::default()),
        }
    }

    /// Collector with a fresh random run id.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl RunCollector for InMemoryCollector {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn record_worker(&self, metrics: WorkerMetrics) {
        let Ok(mut guard) = self.collected.lock() else {
            tracing::warn!("Failed to acquire metrics lock");
            return;
        };
        tracing::debug!(
            task_id = %metrics.task_id,
            status = %metrics.status,
            calls_made = metrics.calls_made,
            elapsed_ms = metrics.elapsed_ms(),
            "Recorded worker metrics"
        );
        guard.workers.push(metrics);
    }

    fn record_round(&self, metrics: RoundMetrics) {
        let Ok(mut guard) = self.collected.lock() else {
            tracing::warn!("Failed to acquire metrics lock");
            return;
        };
        guard.rounds.push(metrics);
    }

    fn flush(&self) -> RunMetrics {
        let Ok(guard) = self.collected.lock() else {
            return RunMetrics {
                run_id: self.run_id.clone(),
                ..Default::default()
            };
        };
        guard.aggregate(&self.run_id)
    }

    fn reset(&self) {
        let Ok(mut guard) = self.collected.lock() else {
            return;
        };
        *guard = Collected::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(task_id: &str, calls: u32, failed: bool) -> WorkerMetrics {
        WorkerMetrics {
            task_id: task_id.to_string(),
            target: "cart".to_string(),
            round: 1,
            status: "inconclusive".to_string(),
            failed,
            calls_made: calls,
            calls_remaining: 8 - calls,
            start_time: 1_700_000_000_000,
            end_time: 1_700_000_000_250,
        }
    }

    #[test]
    fn test_in_memory_collector() {
        let collector = InMemoryCollector::new("run-1");
        collector.record_worker(worker("rca-1.1", 3, false));
        collector.record_worker(worker("rca-1.2", 5, true));
        collector.record_round(RoundMetrics {
            round: 1,
            tasks_dispatched: 2,
            conclusive: 0,
            elapsed_ms: 300,
        });

        let metrics = collector.flush();
        assert_eq!(metrics.run_id, "run-1");
        assert_eq!(metrics.total_tool_calls, 8);
        assert_eq!(metrics.failed_workers, 1);
        assert_eq!(metrics.rounds.len(), 1);
        assert_eq!(metrics.workers[0].elapsed_ms(), 250);

        collector.reset();
        assert!(collector.flush().workers.is_empty());
    }

    #[test]
    fn test_generated_run_ids_differ() {
        let a = InMemoryCollector::generate();
        let b = InMemoryCollector::generate();
        assert_ne!(a.run_id(), b.run_id());
    }
}
