//! Scripted oracle and gateway doubles shared by the engine tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rootcause_config::{DependencyGraph, GraphDefinition};
use rootcause_core::{
    DependencyEdge, DependencyKind, EdgeDirection, GoalCategory, OracleError, RcaTask, ReasoningOracle, ResourceKind,
    ResourceNode, StageContext, TaskStatus, ToolError, ToolGateway, ToolSpec,
};
use serde_json::{json, Value};

type Responder = Box<dyn Fn(&StageContext) -> Result<Value, OracleError> + Send + Sync>;

/// Oracle answering from per-key queues. The key is the task id for worker
/// contexts and the stage name otherwise.
pub struct ScriptedOracle {
    scripts: Mutex<HashMap<String, VecDeque<Result<Value, OracleError>>>>,
    fallback: Option<Responder>,
    seen: Mutex<Vec<StageContext>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn script(self, key: &str, answers: Vec<Result<Value, OracleError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .extend(answers);
        self
    }

    /// Answer used once a key's queue is empty.
    pub fn fallback<F>(mut self, responder: F) -> Self
    where
        F: Fn(&StageContext) -> Result<Value, OracleError> + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(responder));
        self
    }

    pub fn contexts(&self) -> Vec<StageContext> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn decide(&self, context: &StageContext) -> Result<Value, OracleError> {
        self.seen.lock().unwrap().push(context.clone());
        let key = context
            .task_id
            .clone()
            .unwrap_or_else(|| context.stage.as_str().to_string());
        let scripted = self.scripts.lock().unwrap().get_mut(&key).and_then(|q| q.pop_front());
        match (scripted, &self.fallback) {
            (Some(answer), _) => answer,
            (None, Some(responder)) => responder(context),
            (None, None) => Err(OracleError::Backend(format!("no scripted answer for {}", key))),
        }
    }
}

/// Gateway with canned tool results and an optional per-call delay.
pub struct MockGateway {
    tools: Vec<String>,
    results: HashMap<String, Result<Value, ToolError>>,
    triage: HashMap<String, Value>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockGateway {
    pub fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            results: HashMap::new(),
            triage: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Gateway advertising the default investigation tools.
    pub fn standard() -> Self {
        Self::new(&[
            "get_metrics",
            "get_metrics_range",
            "get_traces",
            "get_logs",
            "get_dependencies",
            "get_services_used_by",
            "kubectl_describe",
            crate::TRIAGE_METRICS_TOOL,
        ])
    }

    pub fn with_result(mut self, tool: &str, result: Result<Value, ToolError>) -> Self {
        self.results.insert(tool.to_string(), result);
        self
    }

    pub fn with_triage(mut self, resource: &str, value: Value) -> Self {
        self.triage.insert(resource.to_string(), value);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolGateway for MockGateway {
    fn catalog(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec::new(t.clone(), format!("mock {}", t)))
            .collect()
    }

    async fn invoke(&self, tool: &str, args: &Value) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if tool == crate::TRIAGE_METRICS_TOOL {
            let resource = args["resource"].as_str().unwrap_or_default();
            return self
                .triage
                .get(resource)
                .cloned()
                .ok_or_else(|| ToolError::unavailable(tool, "no metrics"));
        }
        if !self.tools.iter().any(|t| t == tool) {
            return Err(ToolError::unavailable(tool, "unknown tool"));
        }
        self.results
            .get(tool)
            .cloned()
            .unwrap_or_else(|| Ok(json!({"tool": tool, "ok": true})))
    }
}

pub fn tool_request(tool: &str, args: Value) -> Result<Value, OracleError> {
    Ok(json!({
        "action": "tool_request",
        "payload": {"tool": tool, "args": args, "rationale": format!("check {}", tool)}
    }))
}

pub fn submit_diagnosis(diagnosis: &str, conclusive: bool) -> Result<Value, OracleError> {
    Ok(json!({
        "action": "submit",
        "payload": {"diagnosis": diagnosis, "reasoning": "observed in tool output", "conclusive": conclusive}
    }))
}

/// Graph of services joined by infrastructure edges (`from` depends on `to`).
pub fn graph(services: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
    let definition = GraphDefinition {
        resources: services
            .iter()
            .map(|id| ResourceNode::new(*id, ResourceKind::Service))
            .collect(),
        edges: edges
            .iter()
            .map(|(from, to)| DependencyEdge {
                from: from.to_string(),
                to: to.to_string(),
                kind: DependencyKind::Infrastructure,
                direction: EdgeDirection::Forward,
            })
            .collect(),
    };
    DependencyGraph::from_definition(definition).unwrap()
}

pub fn task(id: &str, target: &str, category: GoalCategory) -> RcaTask {
    RcaTask {
        id: id.to_string(),
        goal: format!("Investigate {}", target),
        goal_category: category,
        target: target.to_string(),
        target_kind: ResourceKind::Service,
        tool_hints: Vec::new(),
        priority: 1,
        severity: 0.8,
        symptom_ids: BTreeSet::from([format!("{}/{}", target, category.as_str())]),
        status: TaskStatus::Pending,
        round: 1,
    }
}
