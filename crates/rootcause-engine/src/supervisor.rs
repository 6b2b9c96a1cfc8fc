//! Merges worker reports into a final verdict or a follow-up round.
//!
//! Conclusive reports on linked resources are folded into one root cause.
//! Conclusive reports that disagree about the same resource, or about
//! unrelated resources, are a contradiction and finalize as incomplete. Without any conclusive report
//! the supervisor reschedules follow-up tasks until the round cap.

use std::collections::{BTreeMap, BTreeSet};

use rootcause_config::DependencyGraph;
use rootcause_core::{
    DiagnosticReport, FinalReport, FinalReportSubmission, GoalCategory, RcaTask, ReasoningOracle, ReportStatus,
    RootCauseCandidate, Stage, StageAction, StageContext, Symptom, TaskStatus, UnresolvedReason, UnresolvedTask,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::consult::consult;
use crate::planner::tool_hints_for;

pub struct Supervisor {
    max_rounds: u32,
    max_tasks_per_round: usize,
    hops: usize,
    retries: u32,
}

/// Everything the supervisor sees at the end of a round.
pub struct SupervisorInput<'a> {
    pub symptoms: &'a [Symptom],
    /// Every dispatched task so far, with terminal status.
    pub tasks: &'a [RcaTask],
    pub reports: &'a BTreeMap<String, DiagnosticReport>,
    /// Planned tasks never dispatched.
    pub deferred: &'a [RcaTask],
    /// Round that just finished, starting at 1.
    pub round: u32,
}

/// What is known after a round that did not finalize.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialFinding {
    pub round: u32,
    pub unresolved: Vec<UnresolvedTask>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorDecision {
    Finalize(FinalReport),
    Reschedule {
        finding: PartialFinding,
        tasks: Vec<RcaTask>,
    },
}

impl Supervisor {
    pub fn new(max_rounds: u32, max_tasks_per_round: usize, hops: usize, retries: u32) -> Self {
        Self {
            max_rounds,
            max_tasks_per_round,
            hops,
            retries,
        }
    }

    /// Deterministic decision for the round in `input`.
    pub fn assess(&self, input: &SupervisorInput, graph: &DependencyGraph) -> SupervisorDecision {
        let conclusive = conclusive_reports(input);

        if !conclusive.is_empty() {
            return SupervisorDecision::Finalize(self.finalize_conclusive(input, graph, &conclusive));
        }

        if input.round >= self.max_rounds {
            info!("║ SUPERVISOR: round cap {} reached", self.max_rounds);
            let root = format!("Undetermined: no conclusive diagnosis after {} round(s)", input.round);
            return SupervisorDecision::Finalize(self.finalize_incomplete(input, root, Vec::new()));
        }

        let tasks = self.follow_ups(input, graph);
        if tasks.is_empty() {
            let root = if input.tasks.is_empty() && input.deferred.is_empty() {
                "Undetermined: no symptoms warranted investigation".to_string()
            } else {
                format!("Undetermined: no untried leads after {} round(s)", input.round)
            };
            return SupervisorDecision::Finalize(self.finalize_incomplete(input, root, Vec::new()));
        }

        let unresolved = unresolved(input);
        let finding = PartialFinding {
            round: input.round,
            summary: format!(
                "Round {}: {} task(s) without a conclusive diagnosis, {} follow-up(s) scheduled",
                input.round,
                unresolved.len(),
                tasks.len()
            ),
            unresolved,
        };
        info!("║ SUPERVISOR: {}", finding.summary);
        SupervisorDecision::Reschedule { finding, tasks }
    }

    /// [`Self::assess`], with an oracle-written narrative for complete reports.
    /// The deterministic text is kept if the oracle fails.
    pub async fn supervise(
        &self,
        input: &SupervisorInput<'_>,
        graph: &DependencyGraph,
        oracle: &dyn ReasoningOracle,
    ) -> SupervisorDecision {
        let mut report = match self.assess(input, graph) {
            SupervisorDecision::Finalize(report) if report.complete => report,
            other => return other,
        };

        let context = StageContext::new(
            Stage::Supervisor,
            json!({
                "symptoms": input.symptoms,
                "candidates": report.candidates,
                "reports": report.reports,
                "root_cause": report.root_cause,
            }),
        );
        let narrative = consult(oracle, context, self.retries, |raw| {
            let submission = StageAction::<FinalReportSubmission>::parse_submission(raw)?;
            submission.validate()?;
            Ok(submission)
        })
        .await;

        match narrative {
            Ok(n) => {
                report.root_cause = n.root_cause;
                report.evidence_summary = n.evidence_summary;
                report.investigation_summary = n.investigation_summary;
            }
            Err(e) => warn!("Keeping deterministic final report: {}", e),
        }
        SupervisorDecision::Finalize(report)
    }

    fn finalize_conclusive(
        &self,
        input: &SupervisorInput,
        graph: &DependencyGraph,
        conclusive: &[&DiagnosticReport],
    ) -> FinalReport {
        let contradiction = conclusive.iter().enumerate().any(|(i, a)| {
            conclusive[i + 1..].iter().any(|b| {
                (a.target == b.target || !graph.are_linked(&a.target, &b.target))
                    && normalize(&a.diagnosis) != normalize(&b.diagnosis)
            })
        });

        if contradiction {
            info!("║ SUPERVISOR: {} contradicting conclusive reports", conclusive.len());
            let candidates: Vec<_> = conclusive.iter().map(|r| candidate(r)).collect();
            let resources: BTreeSet<&str> = candidates.iter().map(|c| c.resource.as_str()).collect();
            let root = format!(
                "Inconclusive: {} competing root causes ({})",
                candidates.len(),
                resources.into_iter().collect::<Vec<_>>().join(", ")
            );
            return self.finalize_incomplete(input, root, candidates);
        }

        // The cause most other conclusive targets depend on comes first.
        let reached = |r: &DiagnosticReport| {
            conclusive
                .iter()
                .filter(|o| o.task_id != r.task_id && graph.path_exists(&o.target, &r.target))
                .count()
        };
        let mut ranked: Vec<&DiagnosticReport> = conclusive.to_vec();
        ranked.sort_by(|a, b| reached(*b).cmp(&reached(*a)).then_with(|| a.task_id.cmp(&b.task_id)));
        let primary = ranked[0];
        info!("║ SUPERVISOR: root cause on {} ({})", primary.target, primary.task_id);

        let mut report = self.base_report(input, primary.diagnosis.clone(), true);
        report.candidates = ranked.iter().map(|r| candidate(r)).collect();
        report
    }

    fn finalize_incomplete(
        &self,
        input: &SupervisorInput,
        root_cause: String,
        candidates: Vec<RootCauseCandidate>,
    ) -> FinalReport {
        let mut report = self.base_report(input, root_cause, false);
        report.candidates = candidates;
        report
    }

    fn base_report(&self, input: &SupervisorInput, root_cause: String, complete: bool) -> FinalReport {
        let reports: Vec<DiagnosticReport> = input
            .tasks
            .iter()
            .filter_map(|t| input.reports.get(&t.id).cloned())
            .collect();

        let mut affected: BTreeSet<String> = input.symptoms.iter().map(|s| s.resource.clone()).collect();
        affected.extend(reports.iter().filter(|r| r.is_conclusive()).map(|r| r.target.clone()));

        let evidence_summary = reports
            .iter()
            .map(|r| {
                let detail = match (&r.failure, r.diagnosis.is_empty()) {
                    (Some(failure), true) => failure.as_str(),
                    _ => r.diagnosis.as_str(),
                };
                format!("[{}] {} ({}): {}", r.status.as_str(), r.target, r.task_id, detail)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let count = |status: ReportStatus| reports.iter().filter(|r| r.status == status).count();
        let investigation_summary = format!(
            "{} round(s), {} task(s) dispatched: {} conclusive, {} inconclusive, {} budget-exhausted; {} deferred; {} tool call(s)",
            input.round,
            input.tasks.len(),
            count(ReportStatus::Conclusive),
            count(ReportStatus::Inconclusive),
            count(ReportStatus::BudgetExhausted),
            input.deferred.len(),
            reports.iter().map(|r| r.tool_usage.calls_made).sum::<u32>(),
        );

        FinalReport {
            root_cause,
            candidates: Vec::new(),
            affected_resources: affected.into_iter().collect(),
            evidence_summary,
            investigation_summary,
            reports,
            complete,
            unresolved: unresolved(input),
            rounds: input.round,
        }
    }

    /// Follow-up tasks for the next round, most promising first.
    fn follow_ups(&self, input: &SupervisorInput, graph: &DependencyGraph) -> Vec<RcaTask> {
        let next_round = input.round + 1;
        let mut taken: BTreeSet<(String, GoalCategory)> = input
            .tasks
            .iter()
            .map(|t| (t.target.clone(), t.goal_category))
            .collect();
        let investigated: BTreeSet<&str> = input.tasks.iter().map(|t| t.target.as_str()).collect();
        let mut picked: Vec<RcaTask> = Vec::new();
        let cap = self.max_tasks_per_round;

        let mut offer = |task: RcaTask, picked: &mut Vec<RcaTask>| {
            if picked.len() < cap && taken.insert((task.target.clone(), task.goal_category)) {
                picked.push(task);
            }
        };

        for task in input.deferred {
            let mut task = task.clone();
            task.status = TaskStatus::Pending;
            offer(task, &mut picked);
        }

        let open: Vec<&RcaTask> = input
            .tasks
            .iter()
            .filter(|t| input.reports.get(&t.id).map_or(true, |r| !r.is_conclusive()))
            .collect();

        for (i, a) in open.iter().enumerate() {
            for b in &open[i + 1..] {
                if a.target == b.target || !graph.adjacent_to(&a.target, &b.target) {
                    continue;
                }
                // The dependency end of the edge is where the interaction is observable.
                let (dependent, dependency) = if graph.path_exists(&a.target, &b.target) {
                    (*a, *b)
                } else {
                    (*b, *a)
                };
                let mut symptom_ids = dependent.symptom_ids.clone();
                symptom_ids.extend(dependency.symptom_ids.iter().cloned());
                offer(
                    follow_up(
                        dependency,
                        GoalCategory::Dependency,
                        format!(
                            "Investigate the interaction between {} and its dependency {}",
                            dependent.target, dependency.target
                        ),
                        symptom_ids,
                        graph,
                    ),
                    &mut picked,
                );
            }
        }

        for origin in &open {
            let mut neighbours: Vec<(String, usize)> = graph
                .closure(&origin.target, self.hops)
                .into_iter()
                .filter(|(id, _)| !investigated.contains(id.as_str()))
                .collect();
            neighbours.sort_by(|(a, da), (b, db)| {
                graph
                    .fan_in(b)
                    .cmp(&graph.fan_in(a))
                    .then_with(|| da.cmp(db))
                    .then_with(|| a.cmp(b))
            });
            for (id, _) in neighbours {
                let mut task = follow_up(
                    origin,
                    origin.goal_category,
                    format!(
                        "Check whether {} explains the {} symptoms investigated on {}",
                        id,
                        origin.goal_category.as_str(),
                        origin.target
                    ),
                    origin.symptom_ids.clone(),
                    graph,
                );
                task.target_kind = graph.node(&id).map(|n| n.kind).unwrap_or_default();
                task.target = id;
                offer(task, &mut picked);
            }
        }

        let mut seq = 0;
        for (i, task) in picked.iter_mut().enumerate() {
            task.priority = i as u32 + 1;
            task.round = next_round;
            if task.id.is_empty() {
                seq += 1;
                task.id = RcaTask::id_for(next_round, seq);
            }
        }
        picked
    }
}

fn follow_up(
    origin: &RcaTask,
    category: GoalCategory,
    goal: String,
    symptom_ids: BTreeSet<String>,
    graph: &DependencyGraph,
) -> RcaTask {
    RcaTask {
        id: String::new(),
        goal,
        goal_category: category,
        target: origin.target.clone(),
        target_kind: graph.node(&origin.target).map(|n| n.kind).unwrap_or(origin.target_kind),
        tool_hints: tool_hints_for(category),
        priority: 0,
        severity: origin.severity,
        symptom_ids,
        status: TaskStatus::Pending,
        round: origin.round + 1,
    }
}

fn conclusive_reports<'a>(input: &SupervisorInput<'a>) -> Vec<&'a DiagnosticReport> {
    input
        .tasks
        .iter()
        .filter_map(|t| input.reports.get(&t.id))
        .filter(|r| r.is_conclusive())
        .collect()
}

fn candidate(report: &DiagnosticReport) -> RootCauseCandidate {
    RootCauseCandidate {
        task_id: report.task_id.clone(),
        resource: report.target.clone(),
        diagnosis: report.diagnosis.clone(),
    }
}

fn normalize(diagnosis: &str) -> String {
    diagnosis
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn unresolved(input: &SupervisorInput) -> Vec<UnresolvedTask> {
    let dispatched = input.tasks.iter().filter_map(|t| {
        let report = input.reports.get(&t.id);
        let reason = match (t.status, report.map(|r| r.status)) {
            (_, Some(ReportStatus::Conclusive)) => return None,
            (TaskStatus::Failed, Some(ReportStatus::BudgetExhausted)) => UnresolvedReason::BudgetExhausted,
            (TaskStatus::Failed, _) => UnresolvedReason::Failed,
            (_, Some(ReportStatus::BudgetExhausted)) => UnresolvedReason::BudgetExhausted,
            _ => UnresolvedReason::Inconclusive,
        };
        Some(UnresolvedTask {
            task_id: t.id.clone(),
            target: t.target.clone(),
            reason,
        })
    });
    let deferred = input.deferred.iter().map(|t| UnresolvedTask {
        task_id: t.id.clone(),
        target: t.target.clone(),
        reason: UnresolvedReason::Deferred,
    });
    dispatched.chain(deferred).collect()
}
