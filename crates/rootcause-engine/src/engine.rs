use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rootcause_config::{DependencyGraph, EngineConfig};
use rootcause_core::{DiagnosisError, ObservabilitySummary, RcaTask, ReasoningOracle, RunRecord, ToolGateway};
use rootcause_monitor::{InMemoryCollector, RoundMetrics, RunCollector};
use tracing::info;

use crate::dispatch::{DispatchLimits, DispatchRouter};
use crate::planner::Planner;
use crate::supervisor::{Supervisor, SupervisorDecision, SupervisorInput};
use crate::triage::Triage;
use crate::worker::{RcaWorker, WorkerSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Diagnosis Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Runs one investigation end to end: triage, plan, dispatch rounds and
/// supervision, under the configured round cap and wall-clock ceiling.
pub struct DiagnosisEngine {
    graph: Arc<DependencyGraph>,
    oracle: Arc<dyn ReasoningOracle>,
    gateway: Arc<dyn ToolGateway>,
    config: EngineConfig,
    triage: Triage,
    planner: Planner,
    router: DispatchRouter,
    supervisor: Supervisor,
}

impl DiagnosisEngine {
    pub fn new(
        graph: Arc<DependencyGraph>,
        oracle: Arc<dyn ReasoningOracle>,
        gateway: Arc<dyn ToolGateway>,
        config: EngineConfig,
    ) -> Result<Self, DiagnosisError> {
        config
            .validate()
            .map_err(|e| DiagnosisError::Config(e.to_string()))?;

        let worker = RcaWorker::new(
            Arc::clone(&oracle),
            Arc::clone(&gateway),
            WorkerSettings {
                retries: config.submission_retries,
                insight_max_chars: config.insight_max_chars,
            },
        );

        Ok(Self {
            triage: Triage::new(config.triage.clone(), config.submission_retries),
            planner: Planner::new(config.max_planned_tasks, config.closure_hops, config.submission_retries),
            router: DispatchRouter::new(Arc::new(worker)),
            supervisor: Supervisor::new(
                config.max_rounds,
                config.max_tasks_per_round,
                config.closure_hops,
                config.submission_retries,
            ),
            graph,
            oracle,
            gateway,
            config,
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds an observability summary from the gateway.
    pub async fn gather(&self) -> ObservabilitySummary {
        Triage::gather(self.gateway.as_ref(), &self.graph).await
    }

    /// Runs an investigation with a throwaway in-memory collector.
    pub async fn run(&self, summary: &ObservabilitySummary) -> Result<RunRecord, DiagnosisError> {
        self.run_observed(summary, &InMemoryCollector::generate()).await
    }

    /// Runs an investigation, reporting worker and round metrics to
    /// `collector`. The record's run id is the collector's.
    pub async fn run_observed(
        &self,
        summary: &ObservabilitySummary,
        collector: &dyn RunCollector,
    ) -> Result<RunRecord, DiagnosisError> {
        let started_at_ms = now_ms();
        let deadline = tokio::time::Instant::now() + self.config.run_timeout();

        info!("╔══════════════════════════════════════════════════════════════");
        info!("║ INVESTIGATION: {}", collector.run_id());
        info!("║ Resources: {}, graph nodes: {}", summary.resources.len(), self.graph.len());
        info!("╠══════════════════════════════════════════════════════════════");

        let symptoms = self.triage.triage(summary, self.oracle.as_ref()).await?;
        let plan = self.planner.plan(&symptoms, &self.graph);
        let plan = self
            .planner
            .refine(plan, self.oracle.as_ref(), &self.gateway.catalog())
            .await;

        let limits = DispatchLimits {
            max_parallelism: self.config.max_parallelism,
            per_task_budget: self.config.tool_budget,
            deadline,
        };

        let mut deferred = plan.deferred;
        let mut pending = plan.tasks;
        let mut dispatched: Vec<RcaTask> = Vec::new();
        let mut reports = BTreeMap::new();
        let mut round = 1;

        let final_report = loop {
            if !pending.is_empty() {
                let round_start = tokio::time::Instant::now();
                let outcome = self
                    .router
                    .dispatch(std::mem::take(&mut pending), limits, collector)
                    .await;
                collector.record_round(RoundMetrics {
                    round,
                    tasks_dispatched: outcome.tasks.len(),
                    conclusive: outcome.conclusive(),
                    elapsed_ms: round_start.elapsed().as_millis() as u64,
                });
                dispatched.extend(outcome.tasks);
                reports.extend(outcome.reports);
            }

            let input = SupervisorInput {
                symptoms: &symptoms,
                tasks: &dispatched,
                reports: &reports,
                deferred: &deferred,
                round,
            };
            match self.supervisor.supervise(&input, &self.graph, self.oracle.as_ref()).await {
                SupervisorDecision::Finalize(report) => break report,
                SupervisorDecision::Reschedule { tasks, .. } => {
                    deferred.retain(|d| !tasks.iter().any(|t| t.id == d.id));
                    pending = tasks;
                    round += 1;
                }
            }
        };

        info!("╠══════════════════════════════════════════════════════════════");
        info!("║ ROOT CAUSE: {}", final_report.root_cause);
        info!("║ Complete: {}, rounds: {}", final_report.complete, final_report.rounds);
        info!("╚══════════════════════════════════════════════════════════════");

        let reports = dispatched
            .iter()
            .filter_map(|t| reports.get(&t.id).cloned())
            .collect();
        let mut tasks = dispatched;
        tasks.extend(deferred);

        Ok(RunRecord {
            run_id: collector.run_id().to_string(),
            started_at_ms,
            finished_at_ms: now_ms(),
            symptoms,
            tasks,
            reports,
            final_report,
        })
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{graph, submit_diagnosis, tool_request, MockGateway, ScriptedOracle};
    use rootcause_core::{
        GoldenSignals, OracleError, ReportStatus, ResourceKind, ResourceObservation, StageContext, TaskStatus,
        UnresolvedReason,
    };
    use serde_json::json;

    fn latency(resource: &str, p99: f64) -> ResourceObservation {
        ResourceObservation {
            resource: resource.to_string(),
            kind: ResourceKind::Service,
            signals: Some(GoldenSignals {
                latency_p99_ms: Some(p99),
                latency_baseline_ms: Some(200.0),
                error_rate: Some(0.0),
                ..Default::default()
            }),
            anomalies: Vec::new(),
        }
    }

    fn engine(graph: DependencyGraph, oracle: ScriptedOracle, config: EngineConfig) -> (DiagnosisEngine, Arc<ScriptedOracle>) {
        let oracle = Arc::new(oracle);
        let engine = DiagnosisEngine::new(Arc::new(graph), oracle.clone(), Arc::new(MockGateway::standard()), config).unwrap();
        (engine, oracle)
    }

    /// Oracle that never submits: planner/supervisor answers are invalid and
    /// every worker keeps requesting tools.
    fn stubborn(context: &StageContext) -> Result<serde_json::Value, OracleError> {
        match context.stage {
            rootcause_core::Stage::Worker => tool_request("get_metrics", json!({})),
            _ => Err(OracleError::Backend("offline".into())),
        }
    }

    #[tokio::test]
    async fn test_cascade_diagnosed_in_one_round() {
        let graph = graph(&["frontend", "cart"], &[("frontend", "cart")]);
        let summary = ObservabilitySummary {
            resources: vec![latency("frontend", 2000.0), latency("cart", 1500.0)],
        };
        let oracle = ScriptedOracle::new()
            .script(
                "rca-1.1",
                vec![
                    tool_request("get_traces", json!({"service": "cart"})),
                    submit_diagnosis("cart blocked on exhausted redis pool", true),
                ],
            )
            .fallback(|_| Err(OracleError::Backend("offline".into())));
        let (engine, _) = engine(graph, oracle, EngineConfig::default());
        let collector = InMemoryCollector::new("run-cascade");

        let record = engine.run_observed(&summary, &collector).await.unwrap();
        assert_eq!(record.run_id, "run-cascade");
        assert_eq!(record.symptoms.len(), 2);
        assert_eq!(record.tasks.len(), 1);
        assert_eq!(record.tasks[0].target, "cart");
        assert_eq!(record.tasks[0].status, TaskStatus::Done);
        assert_eq!(record.reports.len(), 1);
        assert!(record.final_report.complete);
        assert_eq!(record.final_report.root_cause, "cart blocked on exhausted redis pool");
        assert_eq!(record.final_report.rounds, 1);
        assert_eq!(collector.flush().total_tool_calls, 1);
    }

    #[tokio::test]
    async fn test_adversarial_oracle_terminates_at_round_cap() {
        let graph = graph(
            &["frontend", "checkout", "cart", "redis", "payment"],
            &[("frontend", "checkout"), ("checkout", "cart"), ("cart", "redis"), ("checkout", "payment")],
        );
        let summary = ObservabilitySummary {
            resources: vec![latency("frontend", 3000.0)],
        };
        let config = EngineConfig {
            tool_budget: 2,
            max_rounds: 3,
            ..Default::default()
        };
        let (engine, oracle) = engine(graph, ScriptedOracle::new().fallback(stubborn), config);

        let record = engine.run(&summary).await.unwrap();
        let report = &record.final_report;
        assert!(!report.complete);
        assert_eq!(report.rounds, 3);
        // frontend, then its closure neighbours, then the dependency edges between them.
        assert_eq!(record.reports.len(), 5);
        assert_eq!(report.reports.len(), record.reports.len());
        assert!(record.tasks.iter().all(|t| t.status.is_terminal()));
        assert!(record
            .reports
            .iter()
            .all(|r| r.status == ReportStatus::BudgetExhausted && r.tool_usage.calls_made == 2));
        assert!(report
            .unresolved
            .iter()
            .any(|u| u.reason == UnresolvedReason::BudgetExhausted));

        let worker_calls = oracle
            .contexts()
            .iter()
            .filter(|c| c.stage == rootcause_core::Stage::Worker)
            .count();
        assert_eq!(worker_calls, record.reports.len() * 2);
    }

    #[tokio::test]
    async fn test_insufficient_data_aborts() {
        let (engine, _) = engine(graph(&["cart"], &[]), ScriptedOracle::new(), EngineConfig::default());
        let result = engine.run(&ObservabilitySummary::default()).await;
        assert!(matches!(result, Err(DiagnosisError::InsufficientData(_))));
    }

    #[tokio::test]
    async fn test_healthy_cluster_finalizes_without_dispatch() {
        let (engine, _) = engine(graph(&["cart"], &[]), ScriptedOracle::new(), EngineConfig::default());
        let summary = ObservabilitySummary {
            resources: vec![latency("cart", 210.0)],
        };

        let record = engine.run(&summary).await.unwrap();
        assert!(record.symptoms.is_empty());
        assert!(record.tasks.is_empty());
        assert!(!record.final_report.complete);
        assert!(record.final_report.root_cause.contains("no symptoms"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            max_parallelism: 0,
            ..Default::default()
        };
        let result = DiagnosisEngine::new(
            Arc::new(graph(&["cart"], &[])),
            Arc::new(ScriptedOracle::new()),
            Arc::new(MockGateway::standard()),
            config,
        );
        assert!(matches!(result, Err(DiagnosisError::Config(_))));
    }

    #[test]
    fn test_unbounded_run_timeout_rejected() {
        let config = EngineConfig {
            run_timeout_secs: u64::MAX,
            ..Default::default()
        };
        let result = DiagnosisEngine::new(
            Arc::new(graph(&["cart"], &[])),
            Arc::new(ScriptedOracle::new()),
            Arc::new(MockGateway::standard()),
            config,
        );
        assert!(matches!(result, Err(DiagnosisError::Config(_))));
    }
}
