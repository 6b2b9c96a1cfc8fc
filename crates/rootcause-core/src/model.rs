//! Investigation data model: symptoms, tasks, reports.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Topology
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of a cluster resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[default]
    Service,
    Pod,
    Datastore,
    Queue,
    Other,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Service => "service",
            ResourceKind::Pod => "pod",
            ResourceKind::Datastore => "datastore",
            ResourceKind::Queue => "queue",
            ResourceKind::Other => "other",
        }
    }
}

/// A resource in the dependency graph. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: String,
    #[serde(default)]
    pub kind: ResourceKind,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ResourceNode {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Infrastructure,
    Data,
}

/// `Forward` means `from` depends on `to`; `Both` declares a mutual dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    #[default]
    Forward,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: DependencyKind,
    #[serde(default)]
    pub direction: EdgeDirection,
}

// ─────────────────────────────────────────────────────────────────────────────
// Symptoms
// ─────────────────────────────────────────────────────────────────────────────

/// One of the four golden signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    Latency,
    Errors,
    Saturation,
    Traffic,
}

impl SignalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::Latency => "latency",
            SignalCategory::Errors => "errors",
            SignalCategory::Saturation => "saturation",
            SignalCategory::Traffic => "traffic",
        }
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who confirmed a symptom. Heuristic findings cannot be overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymptomSource {
    Heuristic,
    Oracle,
}

/// A detected deviation on a resource. Keyed by `(resource, category)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symptom {
    pub id: String,
    pub resource: String,
    pub resource_kind: ResourceKind,
    pub category: SignalCategory,
    pub evidence: String,
    /// Normalised to `0.0..=1.0`.
    pub severity: f64,
    pub source: SymptomSource,
}

impl Symptom {
    pub fn new(
        resource: impl Into<String>,
        resource_kind: ResourceKind,
        category: SignalCategory,
        evidence: impl Into<String>,
        severity: f64,
        source: SymptomSource,
    ) -> Self {
        let resource = resource.into();
        Self {
            id: Self::id_for(&resource, category),
            resource,
            resource_kind,
            category,
            evidence: evidence.into(),
            severity: severity.clamp(0.0, 1.0),
            source,
        }
    }

    /// Symptom ids are derived from the dedup key, so equal keys give equal ids.
    pub fn id_for(resource: &str, category: SignalCategory) -> String {
        format!("{}/{}", resource, category.as_str())
    }

    pub fn key(&self) -> (&str, SignalCategory) {
        (&self.resource, self.category)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Category half of the task dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalCategory {
    Latency,
    Errors,
    Saturation,
    Traffic,
    /// Interaction between two linked resources.
    Dependency,
}

impl GoalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalCategory::Latency => "latency",
            GoalCategory::Errors => "errors",
            GoalCategory::Saturation => "saturation",
            GoalCategory::Traffic => "traffic",
            GoalCategory::Dependency => "dependency",
        }
    }
}

impl From<SignalCategory> for GoalCategory {
    fn from(category: SignalCategory) -> Self {
        match category {
            SignalCategory::Latency => GoalCategory::Latency,
            SignalCategory::Errors => GoalCategory::Errors,
            SignalCategory::Saturation => GoalCategory::Saturation,
            SignalCategory::Traffic => GoalCategory::Traffic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

/// A unit of investigation targeting one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcaTask {
    pub id: String,
    pub goal: String,
    pub goal_category: GoalCategory,
    pub target: String,
    pub target_kind: ResourceKind,
    #[serde(default)]
    pub tool_hints: Vec<String>,
    /// Rank within its plan, 1 is investigated first.
    pub priority: u32,
    /// Highest severity among the originating symptoms.
    pub severity: f64,
    /// Provenance; never empty.
    pub symptom_ids: BTreeSet<String>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Feedback round that created the task (1 = planner).
    pub round: u32,
}

impl RcaTask {
    pub fn id_for(round: u32, seq: usize) -> String {
        format!("rca-{}.{}", round, seq)
    }

    pub fn dedup_key(&self) -> (&str, GoalCategory) {
        (&self.target, self.goal_category)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    Conclusive,
    Inconclusive,
    BudgetExhausted,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Conclusive => "conclusive",
            ReportStatus::Inconclusive => "inconclusive",
            ReportStatus::BudgetExhausted => "budget-exhausted",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub initial_budget: u32,
    pub calls_made: u32,
    pub calls_remaining: u32,
    /// Call counts per tool name.
    #[serde(default)]
    pub by_tool: BTreeMap<String, u32>,
}

impl ToolUsage {
    pub fn unused(budget: u32) -> Self {
        Self {
            initial_budget: budget,
            calls_made: 0,
            calls_remaining: budget,
            by_tool: BTreeMap::new(),
        }
    }
}

/// Output of one completed worker. Produced exactly once per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub task_id: String,
    pub target: String,
    pub diagnosis: String,
    pub reasoning: String,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    pub tool_usage: ToolUsage,
    pub status: ReportStatus,
    /// Set when the worker failed or was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl DiagnosticReport {
    /// Minimal report for a task that never produced a diagnosis.
    pub fn degraded(task: &RcaTask, status: ReportStatus, failure: impl Into<String>, usage: ToolUsage) -> Self {
        let failure = failure.into();
        Self {
            task_id: task.id.clone(),
            target: task.target.clone(),
            diagnosis: String::new(),
            reasoning: failure.clone(),
            insights: Vec::new(),
            steps: Vec::new(),
            tool_usage: usage,
            status,
            failure: Some(failure),
        }
    }

    pub fn is_conclusive(&self) -> bool {
        self.status == ReportStatus::Conclusive
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseCandidate {
    pub task_id: String,
    pub resource: String,
    pub diagnosis: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedReason {
    Inconclusive,
    BudgetExhausted,
    Failed,
    /// Planned but never dispatched.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedTask {
    pub task_id: String,
    pub target: String,
    pub reason: UnresolvedReason,
}

/// Terminal artifact of a run, produced once by the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub root_cause: String,
    #[serde(default)]
    pub candidates: Vec<RootCauseCandidate>,
    pub affected_resources: Vec<String>,
    pub evidence_summary: String,
    pub investigation_summary: String,
    /// Every report consumed to build this one.
    pub reports: Vec<DiagnosticReport>,
    pub complete: bool,
    #[serde(default)]
    pub unresolved: Vec<UnresolvedTask>,
    pub rounds: u32,
}

/// The single JSON document a run produces. Writing it is up to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
    pub symptoms: Vec<Symptom>,
    pub tasks: Vec<RcaTask>,
    pub reports: Vec<DiagnosticReport>,
    pub final_report: FinalReport,
}

impl RunRecord {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
