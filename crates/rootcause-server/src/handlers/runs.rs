//! Stored run API handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use rootcause_core::RunRecord;
use rootcause_monitor::{MetricsSummary, RunQuery, RunSummary, WorkerSpan};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ServerState;

/// Response for listing runs.
#[derive(Serialize)]
pub struct RunsListResponse {
    pub runs: Vec<RunSummary>,
}

/// Response for a single run with its worker spans.
#[derive(Serialize)]
pub struct RunDetailResponse {
    pub run: RunRecord,
    pub spans: Vec<WorkerSpan>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListRunsQuery {
    pub complete: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// GET /api/runs - List runs, newest first.
pub async fn list(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ListRunsQuery>,
) -> Result<Json<RunsListResponse>, AppError> {
    let query = RunQuery {
        complete: params.complete,
        limit: params.limit.or(Some(50)),
        offset: params.offset,
    };

    let runs = state.store.list_runs(&query).map_err(|e| {
        tracing::error!("Failed to list runs: {}", e);
        AppError::Internal("failed to list runs".into())
    })?;

    Ok(Json(RunsListResponse { runs }))
}

/// GET /api/runs/{id} - Get a single run with its spans.
pub async fn get(
    State(state): State<Arc<ServerState>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunDetailResponse>, AppError> {
    let run = state
        .store
        .get_run(&run_id)?
        .ok_or_else(|| AppError::NotFound(format!("run {} not found", run_id)))?;

    let spans = state.store.get_spans(&run_id)?;

    Ok(Json(RunDetailResponse { run, spans }))
}

/// DELETE /api/runs/{id} - Delete a run and its spans.
pub async fn delete(
    State(state): State<Arc<ServerState>>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.store.delete_run(&run_id)? {
        return Err(AppError::NotFound(format!("run {} not found", run_id)));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/metrics/summary - Aggregate metrics over stored runs.
pub async fn metrics_summary(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<MetricsSummary>, AppError> {
    let summary = state.store.get_metrics_summary().map_err(|e| {
        tracing::error!("Failed to get metrics summary: {}", e);
        AppError::Internal("failed to get metrics".into())
    })?;

    Ok(Json(summary))
}
