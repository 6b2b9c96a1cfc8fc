//! Orchestration for rootcause investigations.
//!
//! A run flows through five stages:
//!
//! - [`Triage`] turns an observability summary into symptoms
//! - [`Planner`] groups symptoms into deduplicated, ranked tasks
//! - [`DispatchRouter`] runs one [`RcaWorker`] per task under a parallelism cap
//! - [`Supervisor`] merges reports and either finalizes or reschedules
//! - [`DiagnosisEngine`] drives the loop and returns a [`rootcause_core::RunRecord`]

mod consult;
mod dispatch;
mod engine;
mod planner;
mod supervisor;
mod triage;
mod worker;

#[cfg(test)]
mod test_support;

pub use dispatch::{DispatchLimits, DispatchOutcome, DispatchRouter};
pub use engine::DiagnosisEngine;
pub use planner::{tool_hints_for, PlanOutcome, Planner};
pub use supervisor::{PartialFinding, Supervisor, SupervisorDecision, SupervisorInput};
pub use triage::{Triage, TRIAGE_METRICS_TOOL};
pub use worker::{RcaWorker, WorkerOutput, WorkerSettings};
