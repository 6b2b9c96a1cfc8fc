//! Budgeted tool-use loop investigating a single task.

use std::collections::BTreeMap;
use std::sync::Arc;

use rootcause_core::{
    DiagnosisSubmission, DiagnosticReport, OracleError, RcaTask, ReasoningOracle, ReportStatus, Stage, StageAction,
    StageContext, ToolCallBudget, ToolError, ToolGateway, ToolRequest, ToolUsage,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::consult::consult;

/// Remaining calls at or below which the oracle is told to wrap up.
const BUDGET_WARNING_AT: u32 = 2;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub retries: u32,
    pub insight_max_chars: usize,
}

pub struct RcaWorker {
    oracle: Arc<dyn ReasoningOracle>,
    gateway: Arc<dyn ToolGateway>,
    settings: WorkerSettings,
}

/// A worker's report plus whether the task ended `failed` instead of `done`.
#[derive(Debug, Clone)]
pub struct WorkerOutput {
    pub report: DiagnosticReport,
    pub fatal: bool,
}

/// Evidence gathered so far by one worker. Insights are kept whole; only
/// the copy fed back to the oracle is bounded.
#[derive(Debug, Default)]
struct EvidenceLog {
    insights: Vec<String>,
    steps: Vec<String>,
    by_tool: BTreeMap<String, u32>,
}

impl EvidenceLog {
    fn record_call(&mut self, request: &ToolRequest) {
        *self.by_tool.entry(request.tool.clone()).or_insert(0) += 1;
        let step = match request.rationale.trim() {
            "" => format!("called {}", request.tool),
            rationale => rationale.to_string(),
        };
        self.steps.push(step);
    }

    fn usage(&self, budget: &ToolCallBudget) -> ToolUsage {
        ToolUsage {
            initial_budget: budget.initial(),
            calls_made: budget.used(),
            calls_remaining: budget.remaining(),
            by_tool: self.by_tool.clone(),
        }
    }

    fn report(self, task: &RcaTask, budget: &ToolCallBudget, status: ReportStatus, diagnosis: String, reasoning: String, failure: Option<String>) -> DiagnosticReport {
        DiagnosticReport {
            task_id: task.id.clone(),
            target: task.target.clone(),
            diagnosis,
            reasoning,
            tool_usage: self.usage(budget),
            insights: self.insights,
            steps: self.steps,
            status,
            failure,
        }
    }
}

impl RcaWorker {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, gateway: Arc<dyn ToolGateway>, settings: WorkerSettings) -> Self {
        Self {
            oracle,
            gateway,
            settings,
        }
    }

    /// Investigates `task` until the oracle submits a diagnosis, the budget
    /// runs out, a fatal failure occurs or `cancel` fires. Always returns a
    /// report; tool calls never exceed the budget.
    pub async fn run(&self, task: &RcaTask, mut budget: ToolCallBudget, cancel: CancellationToken) -> WorkerOutput {
        let mut log = EvidenceLog::default();
        info!("║ [{}] WORKER: {} ({})", task.id, task.target, task.goal_category.as_str());

        loop {
            if budget.is_exhausted() {
                info!("║ [{}]     budget exhausted after {} call(s)", task.id, budget.used());
                let reasoning = format!(
                    "No diagnosis was submitted within {} tool call(s); {} observation(s) gathered",
                    budget.initial(),
                    log.insights.len()
                );
                let report = log.report(
                    task,
                    &budget,
                    ReportStatus::BudgetExhausted,
                    String::new(),
                    reasoning,
                    Some("tool budget exhausted".to_string()),
                );
                return WorkerOutput { report, fatal: false };
            }

            let context = self.context(task, &log, &budget);
            let decision = tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(task, log, &budget),
                decision = consult(self.oracle.as_ref(), context, self.settings.retries, |raw| self.validate(raw)) => decision,
            };

            let request = match decision {
                Ok(StageAction::Submit(submission)) => {
                    let status = if submission.conclusive {
                        ReportStatus::Conclusive
                    } else {
                        ReportStatus::Inconclusive
                    };
                    info!("║ [{}]     ✓ {} after {} call(s)", task.id, status.as_str(), budget.used());
                    let report = log.report(task, &budget, status, submission.diagnosis, submission.reasoning, None);
                    return WorkerOutput { report, fatal: false };
                }
                Ok(StageAction::ToolRequest(request)) => request,
                Err(e) => {
                    warn!(task_id = %task.id, "Oracle gave no usable action: {}", e);
                    return fatal(task, log, &budget, format!("oracle: {}", e));
                }
            };

            if !budget.try_consume() {
                continue;
            }
            log.record_call(&request);
            debug!(task_id = %task.id, tool = %request.tool, remaining = budget.remaining(), "Invoking tool");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(task, log, &budget),
                result = self.gateway.invoke(&request.tool, &request.args) => result,
            };

            match result {
                Ok(observation) => {
                    log.insights.push(observation_line(&request, &observation));
                }
                Err(e @ ToolError::Timeout { .. }) => {
                    warn!(task_id = %task.id, "{}", e);
                    log.insights.push(format!("{}({}) -> {}", request.tool, request.args, e));
                }
                Err(e @ ToolError::Unavailable { .. }) => {
                    warn!(task_id = %task.id, "{}", e);
                    return fatal(task, log, &budget, e.to_string());
                }
            }
        }
    }

    fn validate(&self, raw: Value) -> Result<StageAction<DiagnosisSubmission>, OracleError> {
        let action = StageAction::<DiagnosisSubmission>::parse(raw)?;
        match &action {
            StageAction::ToolRequest(request) if !self.gateway.has_tool(&request.tool) => {
                return Err(OracleError::SchemaValidation(format!("unknown tool `{}`", request.tool)));
            }
            StageAction::ToolRequest(_) => {}
            StageAction::Submit(submission) => submission.validate()?,
        }
        Ok(action)
    }

    fn context(&self, task: &RcaTask, log: &EvidenceLog, budget: &ToolCallBudget) -> StageContext {
        let warning = (budget.remaining() <= BUDGET_WARNING_AT).then(|| {
            format!(
                "Only {} tool call(s) left: submit a diagnosis soon, marking it inconclusive if evidence is thin",
                budget.remaining()
            )
        });
        StageContext::new(
            Stage::Worker,
            json!({
                "task": task,
                "insights": log
                    .insights
                    .iter()
                    .map(|insight| bounded(insight, self.settings.insight_max_chars))
                    .collect::<Vec<_>>(),
                "steps": log.steps,
                "tools": self.gateway.catalog(),
                "budget": {
                    "initial": budget.initial(),
                    "used": budget.used(),
                    "remaining": budget.remaining(),
                    "warning": warning,
                },
            }),
        )
        .for_task(task.id.clone())
        .with_budget(budget.remaining())
    }
}

fn cancelled(task: &RcaTask, log: EvidenceLog, budget: &ToolCallBudget) -> WorkerOutput {
    warn!(task_id = %task.id, "Cancelled with {} observation(s)", log.insights.len());
    let reasoning = format!("Run deadline reached after {} tool call(s)", budget.used());
    let report = log.report(
        task,
        budget,
        ReportStatus::BudgetExhausted,
        String::new(),
        reasoning,
        Some("cancelled: run deadline reached".to_string()),
    );
    WorkerOutput { report, fatal: true }
}

fn fatal(task: &RcaTask, log: EvidenceLog, budget: &ToolCallBudget, failure: String) -> WorkerOutput {
    let report = log.report(task, budget, ReportStatus::Inconclusive, String::new(), failure.clone(), Some(failure));
    WorkerOutput { report, fatal: true }
}

fn observation_line(request: &ToolRequest, observation: &Value) -> String {
    format!("{}({}) -> {}", request.tool, request.args, observation)
}

/// `line` cut to `max_chars`, marked with a trailing ellipsis when shortened.
fn bounded(line: &str, max_chars: usize) -> String {
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let mut truncated: String = line.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{submit_diagnosis, task, tool_request, MockGateway, ScriptedOracle};
    use rootcause_core::GoalCategory;
    use std::time::Duration;

    fn worker(oracle: ScriptedOracle, gateway: MockGateway) -> (RcaWorker, Arc<ScriptedOracle>, Arc<MockGateway>) {
        let oracle = Arc::new(oracle);
        let gateway = Arc::new(gateway);
        let worker = RcaWorker::new(
            oracle.clone(),
            gateway.clone(),
            WorkerSettings {
                retries: 1,
                insight_max_chars: 120,
            },
        );
        (worker, oracle, gateway)
    }

    #[tokio::test]
    async fn test_conclusive_diagnosis() {
        let oracle = ScriptedOracle::new().script(
            "rca-1.1",
            vec![
                tool_request("get_logs", json!({"pod": "cart-0"})),
                submit_diagnosis("redis connection pool exhausted", true),
            ],
        );
        let (worker, _, gateway) = worker(oracle, MockGateway::standard());

        let out = worker
            .run(&task("rca-1.1", "cart", GoalCategory::Errors), ToolCallBudget::new(8), CancellationToken::new())
            .await;
        assert!(!out.fatal);
        assert_eq!(out.report.status, ReportStatus::Conclusive);
        assert_eq!(out.report.diagnosis, "redis connection pool exhausted");
        assert_eq!(out.report.tool_usage.calls_made, 1);
        assert_eq!(out.report.tool_usage.calls_remaining, 7);
        assert_eq!(out.report.tool_usage.by_tool["get_logs"], 1);
        assert_eq!(out.report.insights.len(), 1);
        assert_eq!(out.report.steps, vec!["check get_logs".to_string()]);
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_budget_caps_tool_calls() {
        let oracle = ScriptedOracle::new().fallback(|_| tool_request("get_metrics", json!({})));
        let (worker, oracle, gateway) = worker(oracle, MockGateway::standard());

        let out = worker
            .run(&task("rca-1.1", "cart", GoalCategory::Latency), ToolCallBudget::new(3), CancellationToken::new())
            .await;
        assert_eq!(out.report.status, ReportStatus::BudgetExhausted);
        assert_eq!(out.report.tool_usage.calls_made, 3);
        assert_eq!(out.report.tool_usage.calls_remaining, 0);
        assert_eq!(gateway.calls(), 3);
        assert!(!out.fatal);

        let last = oracle.contexts().pop().unwrap();
        assert_eq!(last.budget_remaining, Some(1));
        assert!(last.payload["budget"]["warning"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_tool_reprompted_then_forced_inconclusive() {
        let oracle = ScriptedOracle::new().fallback(|_| tool_request("delete_namespace", json!({})));
        let (worker, oracle, gateway) = worker(oracle, MockGateway::standard());

        let out = worker
            .run(&task("rca-1.1", "cart", GoalCategory::Errors), ToolCallBudget::new(8), CancellationToken::new())
            .await;
        assert!(out.fatal);
        assert_eq!(out.report.status, ReportStatus::Inconclusive);
        assert_eq!(out.report.tool_usage.calls_made, 0);
        assert_eq!(gateway.calls(), 0);
        assert_eq!(oracle.contexts().len(), 2);
        assert!(out.report.failure.unwrap().contains("delete_namespace"));
    }

    #[tokio::test]
    async fn test_timeout_spends_call_and_continues() {
        let oracle = ScriptedOracle::new().script(
            "rca-1.1",
            vec![
                tool_request("get_traces", json!({})),
                submit_diagnosis("tracing backend slow, payment latency unknown", false),
            ],
        );
        let gateway = MockGateway::standard().with_result(
            "get_traces",
            Err(ToolError::Timeout {
                tool: "get_traces".into(),
                elapsed_ms: 30_000,
            }),
        );
        let (worker, _, _) = worker(oracle, gateway);

        let out = worker
            .run(&task("rca-1.1", "payment", GoalCategory::Latency), ToolCallBudget::new(4), CancellationToken::new())
            .await;
        assert!(!out.fatal);
        assert_eq!(out.report.status, ReportStatus::Inconclusive);
        assert_eq!(out.report.tool_usage.calls_made, 1);
        assert!(out.report.insights[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_unavailable_tool_is_fatal() {
        let oracle = ScriptedOracle::new().script("rca-1.1", vec![tool_request("get_logs", json!({}))]);
        let gateway = MockGateway::standard().with_result("get_logs", Err(ToolError::unavailable("get_logs", "loki down")));
        let (worker, _, _) = worker(oracle, gateway);

        let out = worker
            .run(&task("rca-1.1", "cart", GoalCategory::Errors), ToolCallBudget::new(4), CancellationToken::new())
            .await;
        assert!(out.fatal);
        assert_eq!(out.report.status, ReportStatus::Inconclusive);
        assert_eq!(out.report.tool_usage.calls_made, 1);
        assert!(out.report.failure.unwrap().contains("loki down"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_returns_partial_report() {
        let oracle = ScriptedOracle::new().fallback(|_| tool_request("get_metrics", json!({})));
        let gateway = MockGateway::standard().with_delay(Duration::from_secs(10));
        let (worker, _, _) = worker(oracle, gateway);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let out = worker
            .run(&task("rca-1.1", "cart", GoalCategory::Latency), ToolCallBudget::new(8), cancel)
            .await;
        assert!(out.fatal);
        assert_eq!(out.report.status, ReportStatus::BudgetExhausted);
        assert_eq!(out.report.insights.len(), 2);
        assert_eq!(out.report.tool_usage.calls_made, 3);
    }

    #[test]
    fn test_bounded_truncates() {
        let request = ToolRequest {
            tool: "get_logs".into(),
            args: json!({}),
            rationale: String::new(),
        };
        let line = bounded(&observation_line(&request, &json!({"lines": "x".repeat(500)})), 40);
        assert_eq!(line.chars().count(), 40);
        assert!(line.ends_with('…'));
    }

    #[tokio::test]
    async fn test_long_observation_kept_whole_in_report() {
        let oracle = ScriptedOracle::new().script(
            "rca-1.1",
            vec![
                tool_request("get_logs", json!({"pod": "cart-0"})),
                submit_diagnosis("cart-0 out of memory", true),
            ],
        );
        let gateway = MockGateway::standard().with_result(
            "get_logs",
            Ok(json!({"lines": "x".repeat(600), "zfinding": "OOMKilled cart-0"})),
        );
        let (worker, oracle, _) = worker(oracle, gateway);

        let out = worker
            .run(&task("rca-1.1", "cart", GoalCategory::Errors), ToolCallBudget::new(4), CancellationToken::new())
            .await;
        assert_eq!(out.report.insights.len(), 1);
        assert!(out.report.insights[0].contains("OOMKilled cart-0"));

        let fed_back = oracle.contexts().pop().unwrap().payload["insights"][0].as_str().unwrap().to_string();
        assert_eq!(fed_back.chars().count(), 120);
        assert!(fed_back.ends_with('…'));
    }
}
