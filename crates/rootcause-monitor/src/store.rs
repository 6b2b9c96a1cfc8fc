//! SQLite-backed run storage.

use crate::record::{RunQuery, RunSummary, WorkerSpan};
use rootcause_core::RunRecord;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from run store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Lock error")]
    Lock,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// SQLite-backed storage for run documents and worker spans.
pub struct RunStore {
    conn: Mutex<Connection>,
}

impl RunStore {
    /// Opens (or creates) a run store at the given database path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates an in-memory run store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                started_at INTEGER NOT NULL,
                finished_at INTEGER NOT NULL,
                complete INTEGER NOT NULL,
                root_cause TEXT NOT NULL,
                rounds INTEGER NOT NULL,
                task_count INTEGER NOT NULL,
                total_tool_calls INTEGER NOT NULL,
                document TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS worker_spans (
                span_id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                target TEXT NOT NULL,
                round INTEGER NOT NULL,
                status TEXT NOT NULL,
                failed INTEGER NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                calls_made INTEGER NOT NULL,
                calls_remaining INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at DESC);
            CREATE INDEX IF NOT EXISTS idx_spans_run ON worker_spans(run_id);
            "#,
        )?;

        Ok(())
    }

    /// Stores a finished run. Re-inserting the same run id replaces it.
    pub fn insert_run(&self, record: &RunRecord) -> Result<(), StoreError> {
        let document = serde_json::to_string(record)?;
        let total_tool_calls: u32 = record.reports.iter().map(|r| r.tool_usage.calls_made).sum();
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        conn.execute(
            r#"INSERT OR REPLACE INTO runs
               (run_id, started_at, finished_at, complete, root_cause, rounds,
                task_count, total_tool_calls, document)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                record.run_id,
                record.started_at_ms,
                record.finished_at_ms,
                record.final_report.complete,
                record.final_report.root_cause,
                record.final_report.rounds,
                record.tasks.len() as u32,
                total_tool_calls,
                document,
            ],
        )?;

        Ok(())
    }

    /// Retrieves the full run document by id.
    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let result = conn.query_row(
            "SELECT document FROM runs WHERE run_id = ?1",
            params![run_id],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(document) => Ok(Some(serde_json::from_str(&document)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists runs, newest first, with optional filtering.
    pub fn list_runs(&self, query: &RunQuery) -> Result<Vec<RunSummary>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let mut sql = String::from(
            r#"SELECT run_id, started_at, finished_at, complete, root_cause, rounds,
               task_count, total_tool_calls
               FROM runs WHERE 1=1"#,
        );

        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(complete) = query.complete {
            sql.push_str(" AND complete = ?");
            params_vec.push(Box::new(complete));
        }

        sql.push_str(" ORDER BY started_at DESC");

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = query.offset {
            if query.limit.is_none() {
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        let mut stmt = conn.prepare(&sql)?;

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            Ok(RunSummary {
                run_id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                complete: row.get(3)?,
                root_cause: row.get(4)?,
                rounds: row.get(5)?,
                task_count: row.get(6)?,
                total_tool_calls: row.get(7)?,
            })
        })?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }

        Ok(runs)
    }

    /// Inserts a worker span.
    pub fn insert_span(&self, span: &WorkerSpan) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        conn.execute(
            r#"INSERT INTO worker_spans
               (span_id, run_id, task_id, target, round, status, failed,
                start_time, end_time, calls_made, calls_remaining)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                span.span_id,
                span.run_id,
                span.task_id,
                span.target,
                span.round,
                span.status,
                span.failed,
                span.start_time,
                span.end_time,
                span.calls_made,
                span.calls_remaining,
            ],
        )?;

        Ok(())
    }

    /// Gets all worker spans for a run.
    pub fn get_spans(&self, run_id: &str) -> Result<Vec<WorkerSpan>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let mut stmt = conn.prepare(
            r#"SELECT span_id, run_id, task_id, target, round, status, failed,
               start_time, end_time, calls_made, calls_remaining
               FROM worker_spans WHERE run_id = ?1 ORDER BY round, start_time, task_id"#,
        )?;

        let rows = stmt.query_map(params![run_id], |row| {
            Ok(WorkerSpan {
                span_id: row.get(0)?,
                run_id: row.get(1)?,
                task_id: row.get(2)?,
                target: row.get(3)?,
                round: row.get(4)?,
                status: row.get(5)?,
                failed: row.get(6)?,
                start_time: row.get(7)?,
                end_time: row.get(8)?,
                calls_made: row.get(9)?,
                calls_remaining: row.get(10)?,
            })
        })?;

        let mut spans = Vec::new();
        for row in rows {
            spans.push(row?);
        }

        Ok(spans)
    }

    /// Deletes a run and its spans. Returns false when the run was unknown.
    pub fn delete_run(&self, run_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        conn.execute("DELETE FROM worker_spans WHERE run_id = ?1", params![run_id])?;
        let deleted = conn.execute("DELETE FROM runs WHERE run_id = ?1", params![run_id])?;

        Ok(deleted > 0)
    }

    /// Gets aggregate metrics across stored runs.
    pub fn get_metrics_summary(&self) -> Result<MetricsSummary, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let mut stmt = conn.prepare(
            r#"SELECT
               COUNT(*) as total_runs,
               COALESCE(SUM(complete), 0) as complete_runs,
               COALESCE(SUM(total_tool_calls), 0) as total_tool_calls,
               COALESCE(AVG(finished_at - started_at), 0) as avg_elapsed_ms,
               COALESCE(AVG(rounds), 0) as avg_rounds
               FROM runs"#,
        )?;

        let summary = stmt.query_row([], |row| {
            Ok(MetricsSummary {
                total_runs: row.get(0)?,
                complete_runs: row.get(1)?,
                total_tool_calls: row.get(2)?,
                avg_elapsed_ms: row.get(3)?,
                avg_rounds: row.get(4)?,
            })
        })?;

        Ok(summary)
    }
}

/// Aggregate metrics summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_runs: u64,
    pub complete_runs: u64,
    pub total_tool_calls: u64,
    pub avg_elapsed_ms: f64,
    pub avg_rounds: f64,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rootcause_core::{
        DiagnosticReport, FinalReport, GoalCategory, RcaTask, ReportStatus, ResourceKind, TaskStatus, ToolUsage,
    };
    use std::collections::{BTreeMap, BTreeSet};

    pub(crate) fn run_record(run_id: &str, started_at_ms: i64, complete: bool) -> RunRecord {
        let task = RcaTask {
            id: "rca-1.1".to_string(),
            goal: "Determine why cart shows latency issues".to_string(),
            goal_category: GoalCategory::Latency,
            target: "cart".to_string(),
            target_kind: ResourceKind::Service,
            tool_hints: vec!["get_traces".to_string()],
            priority: 1,
            severity: 0.8,
            symptom_ids: BTreeSet::from(["cart/latency".to_string()]),
            status: TaskStatus::Done,
            round: 1,
        };
        let report = DiagnosticReport {
            task_id: task.id.clone(),
            target: "cart".to_string(),
            diagnosis: "redis connection pool exhausted".to_string(),
            reasoning: "traces show waits on redis".to_string(),
            insights: vec!["get_traces({}) -> {...}".to_string()],
            steps: vec!["inspect traces".to_string()],
            tool_usage: ToolUsage {
                initial_budget: 8,
                calls_made: 3,
                calls_remaining: 5,
                by_tool: BTreeMap::from([("get_traces".to_string(), 3)]),
            },
            status: if complete { ReportStatus::Conclusive } else { ReportStatus::Inconclusive },
            failure: None,
        };
        RunRecord {
            run_id: run_id.to_string(),
            started_at_ms,
            finished_at_ms: started_at_ms + 1_000,
            symptoms: Vec::new(),
            tasks: vec![task],
            reports: vec![report.clone()],
            final_report: FinalReport {
                root_cause: report.diagnosis.clone(),
                candidates: Vec::new(),
                affected_resources: vec!["cart".to_string()],
                evidence_summary: String::new(),
                investigation_summary: String::new(),
                reports: vec![report],
                complete,
                unresolved: Vec::new(),
                rounds: 1,
            },
        }
    }

    #[test]
    fn test_run_store_crud() {
        let store = RunStore::in_memory().unwrap();
        store.insert_run(&run_record("run-1", 1_700_000_000_000, true)).unwrap();

        let retrieved = store.get_run("run-1").unwrap().unwrap();
        assert_eq!(retrieved.final_report.root_cause, "redis connection pool exhausted");
        assert_eq!(retrieved.tasks.len(), 1);

        let runs = store.list_runs(&RunQuery::default()).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].total_tool_calls, 3);
        assert!(runs[0].complete);

        assert!(store.delete_run("run-1").unwrap());
        assert!(store.get_run("run-1").unwrap().is_none());
        assert!(!store.delete_run("run-1").unwrap());
    }

    #[test]
    fn test_list_runs_filters_and_orders() {
        let store = RunStore::in_memory().unwrap();
        store.insert_run(&run_record("old", 1_000, true)).unwrap();
        store.insert_run(&run_record("new", 2_000, false)).unwrap();
        store.insert_run(&run_record("newest", 3_000, true)).unwrap();

        let all = store.list_runs(&RunQuery::default()).unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec!["newest", "new", "old"]);

        let complete = store
            .list_runs(&RunQuery {
                complete: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(complete.len(), 2);

        let page = store
            .list_runs(&RunQuery {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page[0].run_id, "new");
    }

    #[test]
    fn test_spans_and_metrics_summary() {
        let store = RunStore::in_memory().unwrap();
        store.insert_run(&run_record("run-1", 1_000, true)).unwrap();
        store.insert_run(&run_record("run-2", 5_000, false)).unwrap();

        let span = WorkerSpan {
            span_id: "span-1".to_string(),
            run_id: "run-1".to_string(),
            task_id: "rca-1.1".to_string(),
            target: "cart".to_string(),
            round: 1,
            status: "conclusive".to_string(),
            failed: false,
            start_time: 1_000,
            end_time: 1_400,
            calls_made: 3,
            calls_remaining: 5,
        };
        store.insert_span(&span).unwrap();
        assert_eq!(store.get_spans("run-1").unwrap(), vec![span]);

        let summary = store.get_metrics_summary().unwrap();
        assert_eq!(summary.total_runs, 2);
        assert_eq!(summary.complete_runs, 1);
        assert_eq!(summary.total_tool_calls, 6);
        assert_eq!(summary.avg_elapsed_ms, 1_000.0);

        store.delete_run("run-1").unwrap();
        assert!(store.get_spans("run-1").unwrap().is_empty());
    }
}
