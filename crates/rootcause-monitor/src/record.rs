//! Stored record types for runs and worker spans.

use serde::{Deserialize, Serialize};

/// Listing row for a stored run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    /// Unix timestamp (milliseconds) when the run started.
    pub started_at: i64,
    pub finished_at: i64,
    pub complete: bool,
    pub root_cause: String,
    pub rounds: u32,
    pub task_count: u32,
    pub total_tool_calls: u32,
}

/// One worker execution within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpan {
    pub span_id: String,
    pub run_id: String,
    pub task_id: String,
    pub target: String,
    pub round: u32,
    pub status: String,
    pub failed: bool,
    pub start_time: i64,
    pub end_time: i64,
    pub calls_made: u32,
    pub calls_remaining: u32,
}

/// Query parameters for listing runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunQuery {
    /// Filter by completeness flag.
    pub complete: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
