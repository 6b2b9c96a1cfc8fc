//! Core domain types and error definitions for rootcause.
//!
//! This crate provides the types shared across the rootcause workspace:
//!
//! - [`Symptom`], [`RcaTask`], [`DiagnosticReport`], [`FinalReport`]: the investigation data model
//! - [`DiagnosisError`] and the stage-local errors it wraps
//! - [`ReasoningOracle`] and [`ToolGateway`]: the two external seams
//! - [`StageAction`]: the closed action type every oracle decision is validated into
//! - [`ToolCallBudget`]: per-worker tool call allowance
//!
//! # Example
//!
//! ```rust
//! use rootcause_core::{ResourceKind, SignalCategory, Symptom, SymptomSource};
//!
//! let symptom = Symptom::new(
//!     "checkout",
//!     ResourceKind::Service,
//!     SignalCategory::Latency,
//!     "p99 5120ms vs 1000ms baseline",
//!     0.9,
//!     SymptomSource::Heuristic,
//! );
//! assert_eq!(symptom.id, "checkout/latency");
//! ```

mod action;
mod boundary;
mod budget;
mod error;
mod model;
mod observation;

pub use action::{
    DiagnosisSubmission, FinalReportSubmission, ProposedSymptom, Stage, StageAction, StageContext,
    SymptomListSubmission, TaskListSubmission, TaskRefinement, ToolRequest,
};
pub use boundary::{ReasoningOracle, ToolGateway, ToolSpec};
pub use budget::ToolCallBudget;
pub use error::{DiagnosisError, GraphParseError, OracleError, ToolError};
pub use model::{
    DependencyEdge, DependencyKind, DiagnosticReport, EdgeDirection, FinalReport, GoalCategory,
    RcaTask, ReportStatus, ResourceKind, ResourceNode, RootCauseCandidate, RunRecord, SignalCategory,
    Symptom, SymptomSource, TaskStatus, ToolUsage, UnresolvedReason, UnresolvedTask,
};
pub use observation::{GoldenSignals, ObservabilitySummary, ResourceObservation};

use serde::{Deserialize, Serialize};

/// Configuration for an LLM model backing the reasoning oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Unique identifier for this model configuration.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// The actual model identifier (e.g., "gpt-5-mini").
    pub model: String,
    /// Optional API base URL for self-hosted or alternative endpoints.
    pub api_base: Option<String>,
}
