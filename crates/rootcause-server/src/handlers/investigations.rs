//! Investigation trigger handler.

use std::path::Path;
use std::sync::Arc;

use axum::{extract::State, Json};
use rootcause_core::{ObservabilitySummary, RunRecord};
use rootcause_monitor::{RunCollector, StoreCollector};
use serde::Deserialize;
use tracing::{error, info};

use crate::error::AppError;
use crate::ServerState;

#[derive(Debug, Deserialize, Default)]
pub struct InvestigationRequest {
    /// Pre-collected observability data; gathered from the gateway when absent.
    #[serde(default)]
    pub summary: Option<ObservabilitySummary>,
}

/// POST /api/investigations - Run one investigation and store it.
pub async fn create(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<InvestigationRequest>,
) -> Result<Json<RunRecord>, AppError> {
    let summary = match req.summary {
        Some(summary) => summary,
        None => {
            info!("No summary supplied, gathering from the tool gateway");
            state.engine.gather().await
        }
    };

    let collector = StoreCollector::new(Arc::clone(&state.store));
    info!("Starting investigation {}", collector.run_id());

    let record = state.engine.run_observed(&summary, &collector).await.map_err(|e| {
        error!("Investigation {} failed: {}", collector.run_id(), e);
        collector.discard();
        AppError::from(e)
    })?;
    collector.finalize(&record)?;

    if let Some(dir) = &state.report_dir {
        write_report(dir, &record).await?;
    }

    Ok(Json(record))
}

async fn write_report(dir: &Path, record: &RunRecord) -> Result<(), AppError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.json", record.run_id));
    tokio::fs::write(&path, record.to_json_pretty()?).await?;
    info!("Report written to {}", path.display());
    Ok(())
}
