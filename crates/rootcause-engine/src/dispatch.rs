//! Concurrent dispatch of RCA tasks to workers.
//!
//! Tasks start in priority order under a parallelism cap. Every dispatched
//! task yields exactly one report: normal completion, worker failure, panic
//! and the run deadline all end in one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rootcause_core::{DiagnosticReport, RcaTask, ReportStatus, TaskStatus, ToolCallBudget, ToolUsage};
use rootcause_monitor::{RunCollector, WorkerMetrics};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::worker::{RcaWorker, WorkerOutput};

#[derive(Debug, Clone, Copy)]
pub struct DispatchLimits {
    pub max_parallelism: usize,
    pub per_task_budget: u32,
    /// Workers still running at this instant are cancelled.
    pub deadline: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Dispatched tasks with their terminal status, in dispatch order.
    pub tasks: Vec<RcaTask>,
    pub reports: BTreeMap<String, DiagnosticReport>,
}

impl DispatchOutcome {
    pub fn conclusive(&self) -> usize {
        self.reports.values().filter(|r| r.is_conclusive()).count()
    }
}

type Finished = (String, WorkerOutput, i64, i64);

pub struct DispatchRouter {
    worker: Arc<RcaWorker>,
}

struct Board<'a> {
    tasks: Vec<RcaTask>,
    reports: BTreeMap<String, DiagnosticReport>,
    collector: &'a dyn RunCollector,
}

impl Board<'_> {
    fn set_status(&mut self, id: &str, status: TaskStatus) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
        }
    }

    fn settle(&mut self, joined: Result<Finished, JoinError>) {
        let (task_id, output, start_time, end_time) = match joined {
            Ok(finished) => finished,
            Err(e) => {
                error!("Worker terminated abnormally: {}", e);
                return;
            }
        };
        if self.reports.contains_key(&task_id) {
            warn!(task_id = %task_id, "Duplicate report discarded");
            return;
        }

        let status = if output.fatal { TaskStatus::Failed } else { TaskStatus::Done };
        self.set_status(&task_id, status);

        let round = self.tasks.iter().find(|t| t.id == task_id).map_or(0, |t| t.round);
        let usage = &output.report.tool_usage;
        self.collector.record_worker(WorkerMetrics {
            task_id: task_id.clone(),
            target: output.report.target.clone(),
            round,
            status: output.report.status.as_str().to_string(),
            failed: output.fatal,
            calls_made: usage.calls_made,
            calls_remaining: usage.calls_remaining,
            start_time,
            end_time,
        });
        self.reports.insert(task_id, output.report);
    }

    /// Gives every task still lacking a report a synthesized one.
    fn reconcile(&mut self, budget: u32) {
        for task in &mut self.tasks {
            if self.reports.contains_key(&task.id) {
                continue;
            }
            let report = match task.status {
                TaskStatus::Pending => DiagnosticReport::degraded(
                    task,
                    ReportStatus::BudgetExhausted,
                    "not started before the run deadline",
                    ToolUsage::unused(budget),
                ),
                _ => DiagnosticReport::degraded(
                    task,
                    ReportStatus::Inconclusive,
                    "worker terminated without a report",
                    ToolUsage::unused(budget),
                ),
            };
            task.status = TaskStatus::Failed;
            self.reports.insert(task.id.clone(), report);
        }
    }
}

impl DispatchRouter {
    pub fn new(worker: Arc<RcaWorker>) -> Self {
        Self { worker }
    }

    /// Runs one worker per pending task and returns once every task has a
    /// report. Tasks that are not pending are ignored.
    pub async fn dispatch(
        &self,
        tasks: Vec<RcaTask>,
        limits: DispatchLimits,
        collector: &dyn RunCollector,
    ) -> DispatchOutcome {
        let (mut queue, skipped): (Vec<_>, Vec<_>) = tasks.into_iter().partition(|t| t.status == TaskStatus::Pending);
        for task in &skipped {
            warn!(task_id = %task.id, status = ?task.status, "Skipping non-pending task");
        }
        queue.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        let order: Vec<RcaTask> = queue.clone();

        info!("║ DISPATCH: {} task(s), parallelism {}", order.len(), limits.max_parallelism);

        let mut board = Board {
            tasks: queue,
            reports: BTreeMap::new(),
            collector,
        };
        let semaphore = Arc::new(Semaphore::new(limits.max_parallelism.max(1)));
        let cancel = CancellationToken::new();
        let mut running: JoinSet<Finished> = JoinSet::new();
        let mut deadline_hit = false;

        'queue: for task in order {
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = sleep_until(limits.deadline) => {
                        deadline_hit = true;
                        break 'queue;
                    }
                    Some(joined) = running.join_next(), if !running.is_empty() => board.settle(joined),
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => break permit,
                        Err(_) => break 'queue,
                    },
                }
            };

            board.set_status(&task.id, TaskStatus::Running);
            let worker = Arc::clone(&self.worker);
            let token = cancel.child_token();
            let budget = limits.per_task_budget;
            running.spawn(async move {
                let _permit = permit;
                let start_time = now_ms();
                let output = worker.run(&task, ToolCallBudget::new(budget), token).await;
                (task.id, output, start_time, now_ms())
            });
        }

        if deadline_hit {
            warn!("Run deadline reached, cancelling {} running worker(s)", running.len());
            cancel.cancel();
        }

        while !running.is_empty() {
            tokio::select! {
                biased;
                _ = sleep_until(limits.deadline), if !deadline_hit => {
                    deadline_hit = true;
                    warn!("Run deadline reached, cancelling {} running worker(s)", running.len());
                    cancel.cancel();
                }
                joined = running.join_next() => match joined {
                    Some(joined) => board.settle(joined),
                    None => break,
                },
            }
        }

        board.reconcile(limits.per_task_budget);

        let mut tasks = board.tasks;
        tasks.extend(skipped);
        DispatchOutcome {
            tasks,
            reports: board.reports,
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
