//! Run collector that persists worker spans and the finished run to a RunStore.

use crate::record::WorkerSpan;
use crate::store::{RunStore, StoreError};
use crate::{InMemoryCollector, RoundMetrics, RunCollector, RunMetrics, WorkerMetrics};
use rootcause_core::RunRecord;
use std::sync::Arc;

/// Collector that writes each worker span through to a [`RunStore`].
pub struct StoreCollector {
    store: Arc<RunStore>,
    inner: InMemoryCollector,
}

impl StoreCollector {
    /// Creates a collector for a fresh run id.
    pub fn new(store: Arc<RunStore>) -> Self {
        Self {
            store,
            inner: InMemoryCollector::generate(),
        }
    }

    /// Stores the finished run document under this collector's run id.
    /// On failure the spans already written for the run are discarded.
    pub fn finalize(&self, record: &RunRecord) -> Result<(), StoreError> {
        if record.run_id != self.inner.run_id() {
            tracing::warn!(
                expected = %self.inner.run_id(),
                actual = %record.run_id,
                "Run record id does not match collector"
            );
        }
        self.store.insert_run(record).inspect_err(|e| {
            tracing::error!("Failed to insert run {}: {}", record.run_id, e);
            self.discard();
        })
    }

    /// Drops every span written under this collector's run id.
    pub fn discard(&self) {
        if let Err(e) = self.store.delete_run(self.inner.run_id()) {
            tracing::warn!("Failed to discard spans of run {}: {}", self.inner.run_id(), e);
        }
    }
}

impl RunCollector for StoreCollector {
    fn run_id(&self) -> &str {
        self.inner.run_id()
    }

    fn record_worker(&self, metrics: WorkerMetrics) {
        let span = WorkerSpan {
            span_id: uuid::Uuid::new_v4().to_string(),
            run_id: self.inner.run_id().to_string(),
            task_id: metrics.task_id.clone(),
            target: metrics.target.clone(),
            round: metrics.round,
            status: metrics.status.clone(),
            failed: metrics.failed,
            start_time: metrics.start_time,
            end_time: metrics.end_time,
            calls_made: metrics.calls_made,
            calls_remaining: metrics.calls_remaining,
        };

        if let Err(e) = self.store.insert_span(&span) {
            tracing::warn!("Failed to insert span: {}", e);
        }

        self.inner.record_worker(metrics);
    }

    fn record_round(&self, metrics: RoundMetrics) {
        self.inner.record_round(metrics);
    }

    fn flush(&self) -> RunMetrics {
        self.inner.flush()
    }

    fn reset(&self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::run_record;

    #[test]
    fn test_store_collector() {
        let store = Arc::new(RunStore::in_memory().unwrap());
        let collector = StoreCollector::new(store.clone());
        let run_id = collector.run_id().to_string();

        collector.record_worker(WorkerMetrics {
            task_id: "rca-1.1".to_string(),
            target: "cart".to_string(),
            round: 1,
            status: "conclusive".to_string(),
            failed: false,
            calls_made: 2,
            calls_remaining: 6,
            start_time: 1_000,
            end_time: 1_200,
        });

        let spans = store.get_spans(&run_id).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].calls_made, 2);
        assert_eq!(collector.flush().total_tool_calls, 2);

        collector.finalize(&run_record(&run_id, 1_000, true)).unwrap();
        assert!(store.get_run(&run_id).unwrap().is_some());
    }

    fn worker_metrics(task_id: &str) -> WorkerMetrics {
        WorkerMetrics {
            task_id: task_id.to_string(),
            target: "cart".to_string(),
            round: 1,
            status: "inconclusive".to_string(),
            failed: false,
            calls_made: 1,
            calls_remaining: 7,
            start_time: 1_000,
            end_time: 1_100,
        }
    }

    #[test]
    fn test_failed_finalize_discards_spans() {
        let path = std::env::temp_dir().join(format!("rootcause-store-{}.db", uuid::Uuid::new_v4()));
        let store = Arc::new(RunStore::new(&path).unwrap());
        let collector = StoreCollector::new(store.clone());
        let run_id = collector.run_id().to_string();
        collector.record_worker(worker_metrics("rca-1.1"));
        assert_eq!(store.get_spans(&run_id).unwrap().len(), 1);

        rusqlite::Connection::open(&path).unwrap().execute_batch("DROP TABLE runs").unwrap();

        let result = collector.finalize(&run_record(&run_id, 1_000, true));
        assert!(result.is_err());
        assert!(store.get_spans(&run_id).unwrap().is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_discard_removes_spans_of_unfinished_run() {
        let store = Arc::new(RunStore::in_memory().unwrap());
        let collector = StoreCollector::new(store.clone());
        collector.record_worker(worker_metrics("rca-1.1"));
        collector.record_worker(worker_metrics("rca-1.2"));

        collector.discard();
        assert!(store.get_spans(collector.run_id()).unwrap().is_empty());
        assert!(store.get_run(collector.run_id()).unwrap().is_none());
    }
}
