//! Structured actions returned by the reasoning oracle.
//!
//! Every stage receives the same envelope, `{"action": ..., "payload": ...}`,
//! and validates it into a closed [`StageAction`] before use.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::model::SignalCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Triage,
    Planner,
    Worker,
    Supervisor,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Triage => "triage",
            Stage::Planner => "planner",
            Stage::Worker => "worker",
            Stage::Supervisor => "supervisor",
        }
    }
}

/// Everything the oracle is given to make one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageContext {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_remaining: Option<u32>,
    /// Validation error from the previous attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub attempt: u32,
}

impl StageContext {
    pub fn new(stage: Stage, payload: serde_json::Value) -> Self {
        Self {
            stage,
            task_id: None,
            payload,
            budget_remaining: None,
            feedback: None,
            attempt: 1,
        }
    }

    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_budget(mut self, remaining: u32) -> Self {
        self.budget_remaining = Some(remaining);
        self
    }

    /// Re-prompt context carrying the rejection reason.
    pub fn retry(&self, feedback: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.feedback = Some(feedback.into());
        next.attempt += 1;
        next
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
    /// Short description of why the call is made; becomes a report step.
    #[serde(default)]
    pub rationale: String,
}

/// Closed result of one oracle decision: call a tool, or submit stage output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum StageAction<S> {
    ToolRequest(ToolRequest),
    Submit(S),
}

impl<S: DeserializeOwned> StageAction<S> {
    pub fn parse(value: serde_json::Value) -> Result<Self, OracleError> {
        Ok(serde_json::from_value(value)?)
    }

    /// For stages that have no tool access.
    pub fn parse_submission(value: serde_json::Value) -> Result<S, OracleError> {
        match Self::parse(value)? {
            StageAction::Submit(submission) => Ok(submission),
            StageAction::ToolRequest(req) => Err(OracleError::SchemaValidation(format!(
                "tool request `{}` not allowed in this stage",
                req.tool
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Submissions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedSymptom {
    pub resource: String,
    pub category: SignalCategory,
    pub evidence: String,
    pub severity: f64,
    /// Ids from the triage evidence catalog backing this symptom.
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymptomListSubmission {
    #[serde(default)]
    pub symptoms: Vec<ProposedSymptom>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRefinement {
    pub task_id: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub tool_hints: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskListSubmission {
    #[serde(default)]
    pub tasks: Vec<TaskRefinement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisSubmission {
    pub diagnosis: String,
    pub reasoning: String,
    /// `false` when the worker gives up without a confirmed cause.
    #[serde(default = "default_true")]
    pub conclusive: bool,
}

fn default_true() -> bool {
    true
}

impl DiagnosisSubmission {
    pub fn validate(&self) -> Result<(), OracleError> {
        if self.diagnosis.trim().is_empty() {
            return Err(OracleError::SchemaValidation("diagnosis must not be empty".into()));
        }
        if self.reasoning.trim().is_empty() {
            return Err(OracleError::SchemaValidation("reasoning must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReportSubmission {
    pub root_cause: String,
    pub evidence_summary: String,
    pub investigation_summary: String,
}

impl FinalReportSubmission {
    pub fn validate(&self) -> Result<(), OracleError> {
        let fields = [
            ("root_cause", &self.root_cause),
            ("evidence_summary", &self.evidence_summary),
            ("investigation_summary", &self.investigation_summary),
        ];
        match fields.iter().find(|(_, v)| v.trim().is_empty()) {
            Some((name, _)) => Err(OracleError::SchemaValidation(format!("{} must not be empty", name))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tool_request() {
        let value = json!({
            "action": "tool_request",
            "payload": {"tool": "get_logs", "args": {"pod": "cart-0"}}
        });
        let action = StageAction::<DiagnosisSubmission>::parse(value).unwrap();
        match action {
            StageAction::ToolRequest(req) => {
                assert_eq!(req.tool, "get_logs");
                assert_eq!(req.args["pod"], "cart-0");
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_submission_defaults_to_conclusive() {
        let value = json!({
            "action": "submit",
            "payload": {"diagnosis": "redis OOM", "reasoning": "restarts match memory limit"}
        });
        let sub = StageAction::<DiagnosisSubmission>::parse_submission(value).unwrap();
        assert!(sub.conclusive);
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_tool_request_rejected_where_not_allowed() {
        let value = json!({"action": "tool_request", "payload": {"tool": "get_metrics"}});
        let err = StageAction::<SymptomListSubmission>::parse_submission(value).unwrap_err();
        assert!(matches!(err, OracleError::SchemaValidation(_)));
    }

    #[test]
    fn test_unknown_action_is_schema_error() {
        let value = json!({"action": "shrug", "payload": {}});
        let err = StageAction::<DiagnosisSubmission>::parse(value).unwrap_err();
        assert!(matches!(err, OracleError::SchemaValidation(_)));
    }

    #[test]
    fn test_final_report_submission_validation() {
        let sub = FinalReportSubmission {
            root_cause: "db down".into(),
            evidence_summary: " ".into(),
            investigation_summary: "two workers".into(),
        };
        assert!(sub.validate().is_err());
    }

    #[test]
    fn test_retry_context_increments_attempt() {
        let ctx = StageContext::new(Stage::Worker, json!({})).for_task("rca-1.1").with_budget(3);
        let next = ctx.retry("missing reasoning");
        assert_eq!(next.attempt, 2);
        assert_eq!(next.feedback.as_deref(), Some("missing reasoning"));
        assert_eq!(next.budget_remaining, Some(3));
    }
}
