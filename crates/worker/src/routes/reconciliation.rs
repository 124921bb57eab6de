//! Manual reconciliation trigger.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use reconciliation::SweepReport;

use crate::AppState;
use crate::error::ApiError;

/// POST /reconciliation/run
///
/// Runs one sweep now, alongside the scheduled ones. Safe because every
/// order write is a monotonic conditional replace.
#[tracing::instrument(skip(state))]
pub async fn run(State(state): State<Arc<AppState>>) -> Result<Json<SweepReport>, ApiError> {
    let report = state.job.sweep().await?;
    Ok(Json(report))
}
