//! # rootcause
//!
//! Multi-agent root-cause diagnosis for Kubernetes incidents.
//!
//! An investigation runs in stages over a fixed service dependency graph:
//!
//! - **Triage** turns observability summaries into a deduplicated symptom list
//! - **Planner** groups symptoms by dependency closure into ranked RCA tasks
//! - **Dispatch Router** runs one budgeted worker per task, in parallel
//! - **Supervisor** correlates the reports and either finalizes or schedules
//!   follow-up tasks for another round
//!
//! Reasoning is delegated to a [`ReasoningOracle`](prelude::ReasoningOracle)
//! and observability access to a [`ToolGateway`](prelude::ToolGateway).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rootcause::prelude::*;
//! use std::sync::Arc;
//!
//! let graph = DependencyGraph::load("graph.json")?;
//! let oracle = LlmOracle::new(ModelConfig {
//!     id: "default".into(),
//!     name: "GPT-4o".into(),
//!     model: "gpt-4o".into(),
//!     api_base: None,
//! });
//! let gateway = HttpToolGateway::new("http://localhost:9000", DEFAULT_TIMEOUT)?;
//!
//! let engine = DiagnosisEngine::new(Arc::new(graph), Arc::new(oracle), Arc::new(gateway), EngineConfig::default())?;
//! let summary = engine.gather().await;
//! let record = engine.run(&summary).await?;
//! println!("{}", record.final_report.root_cause);
//! ```

pub use rootcause_config as config;
pub use rootcause_core as core;
pub use rootcause_engine as engine;
pub use rootcause_llm as llm;
pub use rootcause_monitor as monitor;
pub use rootcause_tools as tools;

/// Prelude for convenient imports.
pub mod prelude {
    pub use rootcause_config::{DependencyGraph, EngineConfig, GraphDefinition, TriageThresholds};
    pub use rootcause_core::{
        DiagnosisError, DiagnosticReport, FinalReport, GoldenSignals, ModelConfig, ObservabilitySummary, RcaTask,
        ReasoningOracle, ReportStatus, ResourceKind, ResourceObservation, RunRecord, Symptom, ToolGateway, ToolSpec,
    };
    pub use rootcause_engine::DiagnosisEngine;
    pub use rootcause_llm::LlmOracle;
    pub use rootcause_monitor::{InMemoryCollector, RunCollector, RunStore, StoreCollector};
    pub use rootcause_tools::{default_catalog, HttpToolGateway, DEFAULT_TIMEOUT};
}
