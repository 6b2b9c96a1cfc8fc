//! Turns symptoms into a ranked, deduplicated list of RCA tasks.
//!
//! Symptoms whose dependency closures share a resource are grouped and the
//! shared resource nearest to all of them becomes the task target, so a
//! cascade yields one task instead of one per symptom.

use std::collections::{BTreeMap, BTreeSet};

use rootcause_config::DependencyGraph;
use rootcause_core::{
    GoalCategory, OracleError, RcaTask, ReasoningOracle, ResourceKind, Stage, StageAction, StageContext, Symptom,
    TaskListSubmission, TaskStatus, ToolSpec,
};
use serde_json::json;
use tracing::{info, warn};

use crate::consult::consult;

pub struct Planner {
    max_tasks: usize,
    hops: usize,
    retries: u32,
}

/// Tasks to dispatch now and tasks held back by the plan cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutcome {
    pub tasks: Vec<RcaTask>,
    pub deferred: Vec<RcaTask>,
}

/// Default tools suggested for each goal category.
pub fn tool_hints_for(category: GoalCategory) -> Vec<String> {
    let tools: &[&str] = match category {
        GoalCategory::Latency => &["get_traces", "get_metrics", "get_services_used_by"],
        GoalCategory::Errors => &["get_logs", "get_traces", "kubectl_describe"],
        GoalCategory::Saturation => &["get_metrics_range", "kubectl_describe"],
        GoalCategory::Traffic => &["get_metrics", "get_traces"],
        GoalCategory::Dependency => &["get_dependencies", "get_metrics", "get_logs"],
    };
    tools.iter().map(|t| t.to_string()).collect()
}

struct Group<'a> {
    /// Resources reachable from every member, with summed hop distance.
    common: BTreeMap<String, usize>,
    members: Vec<&'a Symptom>,
}

impl Planner {
    pub fn new(max_tasks: usize, hops: usize, retries: u32) -> Self {
        Self {
            max_tasks,
            hops,
            retries,
        }
    }

    /// Deterministic plan. Never returns two tasks with the same
    /// `(target, goal_category)`.
    pub fn plan(&self, symptoms: &[Symptom], graph: &DependencyGraph) -> PlanOutcome {
        let mut ordered: Vec<&Symptom> = symptoms.iter().collect();
        ordered.sort_by(|a, b| b.severity.total_cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));

        let mut groups: Vec<Group> = Vec::new();
        for symptom in ordered {
            let closure = if graph.contains(&symptom.resource) {
                graph.closure(&symptom.resource, self.hops)
            } else {
                BTreeMap::from([(symptom.resource.clone(), 0)])
            };

            let joined = groups.iter_mut().find(|g| g.common.keys().any(|k| closure.contains_key(k)));
            match joined {
                Some(group) => {
                    group.common = group
                        .common
                        .iter()
                        .filter_map(|(id, d)| closure.get(id).map(|extra| (id.clone(), d + extra)))
                        .collect();
                    group.members.push(symptom);
                }
                None => groups.push(Group {
                    common: closure,
                    members: vec![symptom],
                }),
            }
        }

        let mut deduped: BTreeMap<(String, GoalCategory), RcaTask> = BTreeMap::new();
        for group in groups {
            let task = self.task_for(&group, graph);
            let key = (task.target.clone(), task.goal_category);
            match deduped.get_mut(&key) {
                Some(existing) => {
                    existing.symptom_ids.extend(task.symptom_ids);
                    existing.severity = existing.severity.max(task.severity);
                }
                None => {
                    deduped.insert(key, task);
                }
            }
        }

        let mut tasks: Vec<RcaTask> = deduped.into_values().collect();
        tasks.sort_by(|a, b| {
            b.severity
                .total_cmp(&a.severity)
                .then_with(|| graph.fan_in(&b.target).cmp(&graph.fan_in(&a.target)))
                .then_with(|| a.target.cmp(&b.target))
                .then_with(|| a.goal_category.cmp(&b.goal_category))
        });
        for (i, task) in tasks.iter_mut().enumerate() {
            task.priority = i as u32 + 1;
            task.id = RcaTask::id_for(1, i + 1);
        }

        let deferred = tasks.split_off(self.max_tasks.min(tasks.len()));
        info!("║ PLAN: {} task(s), {} deferred", tasks.len(), deferred.len());
        PlanOutcome { tasks, deferred }
    }

    /// Lets the oracle reword goals and tool hints. Targets, categories and
    /// provenance stay as planned; any invalid answer keeps the plan as is.
    pub async fn refine(&self, outcome: PlanOutcome, oracle: &dyn ReasoningOracle, tools: &[ToolSpec]) -> PlanOutcome {
        if outcome.tasks.is_empty() {
            return outcome;
        }

        let context = StageContext::new(Stage::Planner, json!({"tasks": outcome.tasks, "tools": tools}));
        let refinements = consult(oracle, context, self.retries, |raw| {
            let submission = StageAction::<TaskListSubmission>::parse_submission(raw)?;
            for r in &submission.tasks {
                if !outcome.tasks.iter().any(|t| t.id == r.task_id) {
                    return Err(OracleError::SchemaValidation(format!("unknown task id {}", r.task_id)));
                }
                if r.goal.as_ref().is_some_and(|g| g.trim().is_empty()) {
                    return Err(OracleError::SchemaValidation(format!("empty goal for {}", r.task_id)));
                }
                let unknown = r
                    .tool_hints
                    .iter()
                    .flatten()
                    .find(|hint| !tools.iter().any(|spec| &spec.name == *hint));
                if let Some(hint) = unknown {
                    return Err(OracleError::SchemaValidation(format!("unknown tool {}", hint)));
                }
            }
            Ok(submission.tasks)
        })
        .await;

        let refinements = match refinements {
            Ok(r) => r,
            Err(e) => {
                warn!("Keeping deterministic plan: {}", e);
                return outcome;
            }
        };

        let mut outcome = outcome;
        for refinement in refinements {
            let Some(task) = outcome.tasks.iter_mut().find(|t| t.id == refinement.task_id) else {
                continue;
            };
            if let Some(goal) = refinement.goal {
                task.goal = goal;
            }
            if let Some(hints) = refinement.tool_hints {
                task.tool_hints = hints;
            }
        }
        outcome
    }

    fn task_for(&self, group: &Group, graph: &DependencyGraph) -> RcaTask {
        let lead = group.members[0];
        let target = group
            .common
            .iter()
            .min_by(|(a, da), (b, db)| {
                da.cmp(db)
                    .then_with(|| graph.fan_in(b).cmp(&graph.fan_in(a)))
                    .then_with(|| a.cmp(b))
            })
            .map(|(id, _)| id.clone())
            .unwrap_or_else(|| lead.resource.clone());

        let target_kind = graph
            .node(&target)
            .map(|n| n.kind)
            .unwrap_or(if target == lead.resource { lead.resource_kind } else { ResourceKind::default() });
        let goal_category = GoalCategory::from(lead.category);
        let symptom_ids: BTreeSet<String> = group.members.iter().map(|s| s.id.clone()).collect();
        let sources: BTreeSet<&str> = group.members.iter().map(|s| s.resource.as_str()).collect();

        let goal = if sources.len() == 1 && sources.contains(target.as_str()) {
            format!("Determine why {} shows {} issues: {}", target, goal_category.as_str(), lead.evidence)
        } else {
            format!(
                "Determine whether {} is the shared cause of {} symptoms on {}",
                target,
                goal_category.as_str(),
                sources.into_iter().collect::<Vec<_>>().join(", ")
            )
        };

        RcaTask {
            id: String::new(),
            goal,
            goal_category,
            tool_hints: tool_hints_for(goal_category),
            target,
            target_kind,
            priority: 0,
            severity: lead.severity,
            symptom_ids,
            status: TaskStatus::Pending,
            round: 1,
        }
    }
}
